use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use shared::{
    domain::{Credentials, Family, Identity, MembershipRole},
    error::{ErrorCode, RemoteException},
    protocol::{
        AuthSessionResponse, FamilyRow, NewFamilyRow, NewMembershipRow, PasswordGrantRequest,
        RefreshGrantRequest, SignUpResponse,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    backend::{FamilyBackend, Mode, Registration, SessionChange, SessionGrant, SessionTokens},
    config::RemoteConfig,
    error::SessionError,
};

const FAMILY_COLUMNS: &str = "id,name,created_at";

#[derive(Clone)]
struct AuthSession {
    identity: Identity,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    fn from_response(response: AuthSessionResponse) -> Self {
        Self {
            identity: response.user.id,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds)),
        }
    }

    fn from_grant(grant: SessionGrant) -> Option<Self> {
        let tokens = grant.tokens?;
        Some(Self {
            identity: grant.identity,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        })
    }

    fn into_grant(self) -> SessionGrant {
        SessionGrant::with_tokens(
            self.identity,
            SessionTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at: self.expires_at,
            },
        )
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Backend talking to a Supabase-style identity and row service.
pub struct LiveBackend {
    http: Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<AuthSession>>,
    changes: broadcast::Sender<SessionChange>,
}

fn auth_failure_code(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Auth,
        _ => ErrorCode::Transport,
    }
}

async fn expect_success(
    response: Response,
    classify: fn(StatusCode) -> ErrorCode,
) -> Result<Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    Err(RemoteException::from_body(status.as_u16(), classify(status), &raw).into())
}

fn row_failure_code(_status: StatusCode) -> ErrorCode {
    ErrorCode::Transport
}

impl LiveBackend {
    pub fn new(config: RemoteConfig) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            http: Client::new(),
            base_url: config.url.as_str().trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            session: Mutex::new(None),
            changes,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    fn authorized(&self, builder: RequestBuilder, session: &AuthSession) -> RequestBuilder {
        self.anon(builder).bearer_auth(&session.access_token)
    }

    fn publish(&self, change: SessionChange) {
        // No receivers simply means nobody is observing yet.
        let _ = self.changes.send(change);
    }

    async fn active_session(&self) -> Option<AuthSession> {
        self.session.lock().await.clone()
    }

    async fn password_grant(&self, credentials: &Credentials) -> Result<SessionGrant, SessionError> {
        let response = self
            .anon(
                self.http
                    .post(self.endpoint("auth/v1/token"))
                    .query(&[("grant_type", "password")]),
            )
            .json(&PasswordGrantRequest {
                email: credentials.email.clone(),
                password: credentials.password.clone(),
            })
            .send()
            .await?;
        let body: AuthSessionResponse = expect_success(response, auth_failure_code)
            .await?
            .json()
            .await?;
        Ok(AuthSession::from_response(body).into_grant())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, SessionError> {
        let response = self
            .anon(
                self.http
                    .post(self.endpoint("auth/v1/token"))
                    .query(&[("grant_type", "refresh_token")]),
            )
            .json(&RefreshGrantRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await?;
        let body: AuthSessionResponse = expect_success(response, auth_failure_code)
            .await?
            .json()
            .await?;
        Ok(AuthSession::from_response(body))
    }

    /// Swaps `expired` for `replacement` unless the session was signed out or
    /// replaced in the meantime. Returns the identity left active.
    async fn replace_expired(
        &self,
        expired: &AuthSession,
        replacement: Option<AuthSession>,
    ) -> Option<Identity> {
        let mut session = self.session.lock().await;
        let unchanged = session
            .as_ref()
            .is_some_and(|active| active.access_token == expired.access_token);
        if !unchanged {
            return session.as_ref().map(|active| active.identity.clone());
        }

        *session = replacement;
        let identity = session.as_ref().map(|active| active.identity.clone());
        if identity.is_none() {
            self.publish(SessionChange::SignedOut);
        }
        identity
    }

    async fn insert_family(
        &self,
        session: &AuthSession,
        name: &str,
    ) -> Result<Family, SessionError> {
        let response = self
            .authorized(self.http.post(self.endpoint("rest/v1/families")), session)
            .header("Prefer", "return=representation")
            .json(&NewFamilyRow {
                name: name.to_string(),
            })
            .send()
            .await?;
        let rows: Vec<FamilyRow> = expect_success(response, row_failure_code)
            .await?
            .json()
            .await?;
        rows.into_iter()
            .next()
            .map(Family::from)
            .ok_or_else(|| SessionError::Transport("family insert returned no row".into()))
    }

    async fn insert_membership(
        &self,
        session: &AuthSession,
        membership: &NewMembershipRow,
    ) -> Result<(), SessionError> {
        let response = self
            .authorized(
                self.http.post(self.endpoint("rest/v1/family_members")),
                session,
            )
            .json(membership)
            .send()
            .await?;
        expect_success(response, row_failure_code).await?;
        Ok(())
    }
}

#[async_trait]
impl FamilyBackend for LiveBackend {
    fn mode(&self) -> Mode {
        Mode::Live
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionGrant, SessionError> {
        self.password_grant(credentials)
            .await
            .map_err(SessionError::into_auth)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Registration, SessionError> {
        let response = self
            .anon(self.http.post(self.endpoint("auth/v1/signup")))
            .json(&PasswordGrantRequest {
                email: credentials.email.clone(),
                password: credentials.password.clone(),
            })
            .send()
            .await?;
        let body: SignUpResponse = expect_success(response, auth_failure_code)
            .await?
            .json()
            .await?;
        Ok(match body {
            SignUpResponse::Session(session) => {
                Registration::Session(AuthSession::from_response(session).into_grant())
            }
            SignUpResponse::Pending(user) => Registration::PendingConfirmation {
                email: user.email.unwrap_or_else(|| credentials.email.clone()),
            },
        })
    }

    async fn activate_session(&self, grant: SessionGrant) {
        let Some(session) = AuthSession::from_grant(grant) else {
            warn!("auth: ignoring session grant without tokens");
            return;
        };
        let identity = session.identity.clone();
        *self.session.lock().await = Some(session);
        self.publish(SessionChange::SignedIn(identity));
    }

    async fn active_identity(&self) -> Option<Identity> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.identity.clone())
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        self.publish(SessionChange::SignedOut);

        let response = self
            .authorized(self.http.post(self.endpoint("auth/v1/logout")), &session)
            .send()
            .await?;
        expect_success(response, auth_failure_code).await?;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Identity>, SessionError> {
        let Some(session) = self.active_session().await else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session.identity));
        }

        let refreshed = match session.refresh_token.as_deref() {
            None => {
                info!(user_id = %session.identity, "auth: session expired without refresh token");
                None
            }
            Some(refresh_token) => match self.refresh(refresh_token).await {
                Ok(refreshed) => Some(refreshed),
                Err(err) => {
                    let err = err.into_auth();
                    warn!(user_id = %session.identity, error = %err, "auth: session refresh failed");
                    None
                }
            },
        };
        Ok(self.replace_expired(&session, refreshed).await)
    }

    async fn list_families(&self) -> Result<Vec<Family>, SessionError> {
        let Some(session) = self.active_session().await else {
            return Ok(Vec::new());
        };
        let response = self
            .authorized(self.http.get(self.endpoint("rest/v1/families")), &session)
            .query(&[("select", FAMILY_COLUMNS), ("order", "created_at.desc")])
            .send()
            .await?;
        let rows: Vec<FamilyRow> = expect_success(response, row_failure_code)
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().map(Family::from).collect())
    }

    async fn create_family(
        &self,
        creator: Option<&Identity>,
        name: &str,
    ) -> Result<Family, SessionError> {
        let creator = creator
            .ok_or_else(|| SessionError::Precondition("sign in to create a family".into()))?;
        let session = self
            .active_session()
            .await
            .ok_or_else(|| SessionError::Precondition("no active session".into()))?;

        let family = self.insert_family(&session, name).await?;
        let membership = NewMembershipRow {
            family_id: family.id.clone(),
            user_id: creator.clone(),
            role: MembershipRole::Admin,
        };
        if let Err(err) = self.insert_membership(&session, &membership).await {
            warn!(
                family_id = %family.id,
                user_id = %creator,
                error = %err,
                "families: membership insert failed, family row left orphaned"
            );
            return Err(SessionError::PartialFailure {
                family_id: family.id,
                reason: err.to_string(),
            });
        }

        info!(family_id = %family.id, user_id = %creator, "families: created");
        Ok(family)
    }

    fn observe_session_changes(&self) -> Option<broadcast::Receiver<SessionChange>> {
        Some(self.changes.subscribe())
    }
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;
