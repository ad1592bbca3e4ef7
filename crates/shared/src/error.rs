use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Auth,
    Validation,
    Precondition,
    Transport,
    PartialFailure,
}

/// Error body returned by the identity/data service.
///
/// The auth endpoints and the row endpoints disagree on field names, so every
/// known spelling is optional and `message()` picks the most specific one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RemoteErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct RemoteException {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteException {
    pub fn new(status: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Decodes a failed response body, falling back to the raw text.
    pub fn from_body(status: u16, code: ErrorCode, raw: &str) -> Self {
        let message = serde_json::from_str::<RemoteErrorBody>(raw)
            .ok()
            .and_then(|body| body.message().map(str::to_string))
            .unwrap_or_else(|| {
                if raw.trim().is_empty() {
                    format!("request failed with status {status}")
                } else {
                    raw.trim().to_string()
                }
            });
        Self::new(status, code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_error_description_over_error_tag() {
        let raw = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let err = RemoteException::from_body(400, ErrorCode::Auth, raw);
        assert_eq!(err.message, "Invalid login credentials");
    }

    #[test]
    fn falls_back_to_raw_text_and_status() {
        assert_eq!(
            RemoteException::from_body(502, ErrorCode::Transport, "bad gateway").message,
            "bad gateway"
        );
        assert_eq!(
            RemoteException::from_body(500, ErrorCode::Transport, "  ").message,
            "request failed with status 500"
        );
    }
}
