use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Family, FamilyId, Identity, MembershipRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordGrantRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshGrantRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSessionResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

/// Sign-up answers with a full session when email confirmation is disabled
/// and with the bare user record when confirmation is still pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(AuthSessionResponse),
    Pending(AuthUser),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyRow {
    pub id: FamilyId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<FamilyRow> for Family {
    fn from(row: FamilyRow) -> Self {
        Family::new(row.id, row.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFamilyRow {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembershipRow {
    pub family_id: FamilyId,
    pub user_id: Identity,
    pub role: MembershipRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    pub user_id: String,
    pub family_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckoutResponse {
    Redirect { url: String },
    Rejected { error: String },
}
