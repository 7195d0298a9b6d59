//! Error types for repository and registry operations

use thiserror::Error;

/// Repository and registry errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepoError {
    // ============ Git Errors ============
    #[error("Repository not found: {url}")]
    RepositoryNotFound { url: String },

    #[error("Authentication failed for {url}: {message}\nHint: Check that the git token has write access to the repository")]
    AuthFailed { url: String, message: String },

    #[error("Push to {url} was rejected: {message}\nHint: The repository changed concurrently, try again")]
    PushRejected { url: String, message: String },

    #[error("File not found in repository: {path}")]
    FileNotFound { path: String },

    #[error("Git error: {message}")]
    Git { message: String },

    // ============ Registry Errors ============
    #[error("Runtime definition not found at {url}")]
    DefinitionNotFound { url: String },

    #[error(
        "runtime definition version {found} is not supported by this client (max {supported})"
    )]
    UnsupportedDefinition { found: String, supported: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Invalid url: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    // ============ Other ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Core(#[from] rtctl_core::CoreError),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Missing repository, file or definition
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepoError::RepositoryNotFound { .. }
                | RepoError::FileNotFound { .. }
                | RepoError::DefinitionNotFound { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RepoError::AuthFailed { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoError::PushRejected { .. })
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for RepoError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepoError::Git {
            message: format!("git task failed: {}", e),
        }
    }
}
