//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// A pre-flight check rejected the operation
    #[error("{message}")]
    #[diagnostic(code(rtctl::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An operation step failed
    #[error("{message}")]
    #[diagnostic(code(rtctl::cli::step))]
    Step {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A wait ran out of attempts
    #[error("{message}")]
    #[diagnostic(code(rtctl::cli::timeout))]
    Timeout {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("operation cancelled")]
    #[diagnostic(code(rtctl::cli::cancelled))]
    Cancelled,

    /// Missing or inconsistent arguments
    #[error("{message}")]
    #[diagnostic(code(rtctl::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(rtctl::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Step { .. } => exit_codes::STEP_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Cancelled => exit_codes::CANCELLED,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error with help text
    pub fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<rtctl_orchestrator::Error> for CliError {
    fn from(err: rtctl_orchestrator::Error) -> Self {
        let help = err.hint().map(str::to_string);
        let message = err.to_string();
        if err.is_cancelled() {
            CliError::Cancelled
        } else if err.is_validation() {
            CliError::Validation { message, help }
        } else if err.is_timeout() {
            CliError::Timeout { message, help }
        } else if err.step().is_some() {
            CliError::Step { message, help }
        } else {
            CliError::Other { message }
        }
    }
}

impl From<rtctl_core::CoreError> for CliError {
    fn from(err: rtctl_core::CoreError) -> Self {
        CliError::other(err.to_string())
    }
}

impl From<rtctl_kube::KubeError> for CliError {
    fn from(err: rtctl_kube::KubeError) -> Self {
        CliError::other(format!("failed to connect to the cluster: {}", err))
    }
}

impl From<rtctl_platform::PlatformError> for CliError {
    fn from(err: rtctl_platform::PlatformError) -> Self {
        CliError::other(err.to_string())
    }
}

impl From<rtctl_repo::RepoError> for CliError {
    fn from(err: rtctl_repo::RepoError) -> Self {
        CliError::other(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::other(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
