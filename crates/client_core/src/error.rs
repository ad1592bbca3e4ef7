use shared::{
    domain::FamilyId,
    error::{ErrorCode, RemoteException},
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("precondition not met: {0}")]
    Precondition(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("family {family_id} was created but its membership was not: {reason}")]
    PartialFailure { family_id: FamilyId, reason: String },
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Auth(_) => ErrorCode::Auth,
            SessionError::Validation(_) => ErrorCode::Validation,
            SessionError::Precondition(_) => ErrorCode::Precondition,
            SessionError::Transport(_) => ErrorCode::Transport,
            SessionError::PartialFailure { .. } => ErrorCode::PartialFailure,
        }
    }

    /// Credential exchanges report every failure as `Auth`; an unreachable
    /// or failing service keeps its cause in the message.
    pub(crate) fn into_auth(self) -> Self {
        match self {
            SessionError::Transport(cause) => {
                SessionError::Auth(format!("identity service unavailable: {cause}"))
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<RemoteException> for SessionError {
    fn from(err: RemoteException) -> Self {
        match err.code {
            ErrorCode::Auth => SessionError::Auth(err.message),
            ErrorCode::Validation => SessionError::Validation(err.message),
            ErrorCode::Precondition => SessionError::Precondition(err.message),
            ErrorCode::Transport | ErrorCode::PartialFailure => {
                SessionError::Transport(format!("{} (status {})", err.message, err.status))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("sign in before starting checkout")]
    MissingIdentity,
    #[error("select a family before starting checkout")]
    MissingFamily,
    #[error("unknown plan `{0}`")]
    UnknownPlan(String),
    #[error("checkout rejected: {0}")]
    Rejected(String),
    #[error("unexpected checkout response: {0}")]
    UnexpectedResponse(String),
    #[error("checkout request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
