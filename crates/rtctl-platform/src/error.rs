//! Error types for control plane operations

use thiserror::Error;

/// Control plane errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("Not authorized: {message}\nHint: Check your control plane API token")]
    Unauthorized { message: String },

    #[error("Control plane returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Failed to decode control plane response: {0}")]
    Decode(String),

    #[error("Invalid control plane url: {0}")]
    InvalidUrl(String),
}

/// Result type for control plane operations
pub type Result<T> = std::result::Result<T, PlatformError>;

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists { .. })
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        PlatformError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PlatformError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            PlatformError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            PlatformError::Network {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        PlatformError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for PlatformError {
    fn from(e: url::ParseError) -> Self {
        PlatformError::InvalidUrl(e.to_string())
    }
}
