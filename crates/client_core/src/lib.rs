//! Identity and family-membership session core for the KinRecall site.
//!
//! The presentation layer reads [`SessionStore`] and drives
//! [`FamilyManager`]; the manager runs against either the in-memory
//! [`DemoBackend`] or the remote [`LiveBackend`], chosen once at startup
//! through [`BackendSelection`].

use shared::error::ErrorCode;

pub mod backend;
pub mod checkout;
pub mod config;
pub mod demo;
pub mod error;
pub mod live;
pub mod manager;
pub mod store;

pub use backend::{
    BackendSelection, FamilyBackend, Mode, Registration, SessionChange, SessionGrant, SignUpOutcome,
};
pub use checkout::{CheckoutInitiator, Navigator};
pub use config::{load_settings, RemoteConfig, Settings};
pub use demo::DemoBackend;
pub use error::{CheckoutError, SessionError};
pub use live::LiveBackend;
pub use manager::{FamilyManager, SessionWatch};
pub use store::{SessionState, SessionStore};

/// User-facing messages for outcomes that are not returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error { code: ErrorCode, message: String },
    SignUpPending { email: String },
    SignUpUnsupported,
    CheckoutFailed { message: String },
}

impl Notice {
    pub fn error(err: &SessionError) -> Self {
        Notice::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "tests/mock_remote.rs"]
mod mock_remote;
