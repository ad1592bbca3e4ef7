use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{Credentials, Family, Identity};
use tokio::sync::broadcast;

use crate::{config::Settings, demo::DemoBackend, error::SessionError, live::LiveBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Demo,
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Demo => f.write_str("demo"),
            Mode::Live => f.write_str("live"),
        }
    }
}

/// Auth transition pushed by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn(Identity),
    SignedOut,
}

impl SessionChange {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionChange::SignedIn(identity) => Some(identity),
            SessionChange::SignedOut => None,
        }
    }
}

/// What the manager reports back for a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The service issued a session right away. It still arrives through
    /// the session-change feed, not through this value.
    Registered(Identity),
    PendingConfirmation { email: String },
    Unsupported,
}

#[derive(Clone)]
pub(crate) struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A completed credential exchange.
///
/// A grant is inert until it is handed back through
/// [`FamilyBackend::activate_session`]; a grant that is dropped instead leaves
/// the backend's session untouched.
#[derive(Clone)]
pub struct SessionGrant {
    pub identity: Identity,
    pub(crate) tokens: Option<SessionTokens>,
}

impl SessionGrant {
    /// A grant for backends that hold no tokens.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            tokens: None,
        }
    }

    pub(crate) fn with_tokens(identity: Identity, tokens: SessionTokens) -> Self {
        Self {
            identity,
            tokens: Some(tokens),
        }
    }
}

impl fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGrant")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Backend answer to a sign-up request.
#[derive(Debug)]
pub enum Registration {
    Session(SessionGrant),
    PendingConfirmation { email: String },
    Unsupported,
}

/// The capability set both operating modes provide.
///
/// Implementations never touch the session store; the manager applies their
/// results. Credential exchanges return a [`SessionGrant`] and only
/// [`activate_session`](FamilyBackend::activate_session) makes it the session
/// later calls run under.
#[async_trait]
pub trait FamilyBackend: Send + Sync {
    fn mode(&self) -> Mode;

    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionGrant, SessionError>;

    async fn sign_up(&self, credentials: &Credentials) -> Result<Registration, SessionError>;

    /// Replaces the active session and announces it on the change feed.
    async fn activate_session(&self, grant: SessionGrant);

    /// Identity of the active session. Never touches the network.
    async fn active_identity(&self) -> Option<Identity>;

    async fn sign_out(&self) -> Result<(), SessionError>;

    /// The active session, refreshed first if it has expired.
    async fn current_session(&self) -> Result<Option<Identity>, SessionError>;

    /// Families visible to the signed-in identity, most recent first.
    async fn list_families(&self) -> Result<Vec<Family>, SessionError>;

    /// `name` arrives trimmed and non-empty.
    async fn create_family(
        &self,
        creator: Option<&Identity>,
        name: &str,
    ) -> Result<Family, SessionError>;

    /// `None` when the backend has no notification source.
    fn observe_session_changes(&self) -> Option<broadcast::Receiver<SessionChange>>;
}

/// Whether a remote identity service was configured at startup.
pub enum BackendSelection {
    Configured(LiveBackend),
    Unconfigured,
}

impl BackendSelection {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(match settings.remote()? {
            Some(remote) => BackendSelection::Configured(LiveBackend::new(remote)),
            None => BackendSelection::Unconfigured,
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            BackendSelection::Configured(_) => Mode::Live,
            BackendSelection::Unconfigured => Mode::Demo,
        }
    }

    pub fn into_backend(self) -> Arc<dyn FamilyBackend> {
        match self {
            BackendSelection::Configured(live) => Arc::new(live),
            BackendSelection::Unconfigured => Arc::new(DemoBackend::new()),
        }
    }
}
