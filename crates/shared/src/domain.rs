use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(Identity);
id_newtype!(FamilyId);
id_newtype!(PlanId);

impl FamilyId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
}

impl Family {
    pub fn new(id: FamilyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Admin,
    Member,
}

/// Email/password pair handed to the identity backend.
///
/// `Debug` redacts the password so credentials can travel through
/// instrumented code paths.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub price_pence: u32,
    pub featured: bool,
}

impl Plan {
    pub fn price_label(&self) -> String {
        let pounds = self.price_pence / 100;
        if pounds >= 1000 {
            format!("£{},{:03} one-time", pounds / 1000, pounds % 1000)
        } else {
            format!("£{pounds} one-time")
        }
    }
}

pub const PLANS: &[Plan] = &[
    Plan {
        id: "starter-capsule",
        name: "Starter Capsule",
        price_pence: 24_900,
        featured: false,
    },
    Plan {
        id: "family-legacy-vault",
        name: "Family Legacy Vault",
        price_pence: 99_000,
        featured: true,
    },
    Plan {
        id: "kinrecall-box",
        name: "KinRecall Box",
        price_pence: 290_000,
        featured: false,
    },
];

pub fn find_plan(id: &PlanId) -> Option<&'static Plan> {
    PLANS.iter().find(|plan| plan.id == id.as_str())
}
