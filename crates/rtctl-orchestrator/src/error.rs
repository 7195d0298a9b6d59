//! Error taxonomy for runtime operations

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pre-flight checks, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightCheck {
    /// Request validation, before any remote call
    Request,
    /// Account git provider matches the installation repository host
    GitProvider,
    /// Runtime definition download
    Definition,
    /// Definition schema supported by this client
    CliVersion,
    /// No other GitOps server owns the cluster
    Collision,
    /// Runtime name not taken on the control plane
    ExistingRuntime,
    /// Minimum cluster capabilities
    ClusterRequirements,
    /// Ingress class resolution
    Ingress,
    /// Operator approval of a recovery's new bindings
    RecoveryApproval,
}

impl std::fmt::Display for PreflightCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PreflightCheck::Request => "request",
            PreflightCheck::GitProvider => "git provider",
            PreflightCheck::Definition => "runtime definition",
            PreflightCheck::CliVersion => "cli version",
            PreflightCheck::Collision => "runtime collision",
            PreflightCheck::ExistingRuntime => "existing runtime",
            PreflightCheck::ClusterRequirements => "cluster requirements",
            PreflightCheck::Ingress => "ingress",
            PreflightCheck::RecoveryApproval => "recovery approval",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised by install, uninstall and upgrade
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A pre-flight check rejected the operation; nothing was changed
    #[error("{check} check failed: {message}")]
    Validation {
        check: PreflightCheck,
        message: String,
        hint: Option<String>,
    },

    /// A step failed
    #[error("{label} failed: {source}")]
    Step {
        step: String,
        label: String,
        #[source]
        source: Box<Error>,
        hint: Option<String>,
    },

    /// A poll ran out of attempts
    #[error("timed out while waiting for {what}")]
    Timeout { what: String, attempts: u32 },

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A step could not proceed
    #[error("{0}")]
    Failed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] rtctl_core::CoreError),

    #[error(transparent)]
    Repo(#[from] rtctl_repo::RepoError),

    #[error(transparent)]
    Kube(#[from] rtctl_kube::KubeError),

    #[error(transparent)]
    Platform(#[from] rtctl_platform::PlatformError),
}

impl Error {
    pub fn validation(check: PreflightCheck, message: impl Into<String>) -> Self {
        Error::Validation {
            check,
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a hint to a validation or step error
    pub fn with_hint(mut self, new_hint: impl Into<String>) -> Self {
        if let Error::Validation { hint, .. } | Error::Step { hint, .. } = &mut self {
            *hint = Some(new_hint.into());
        }
        self
    }

    /// Whether the root cancellation signal caused this error
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether a poll running out of attempts caused this error
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Step { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Pre-flight check that rejected the operation
    pub fn failed_check(&self) -> Option<PreflightCheck> {
        match self {
            Error::Validation { check, .. } => Some(*check),
            _ => None,
        }
    }

    /// Remedial hint for the operator
    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::Validation { hint, .. } => hint.as_deref(),
            Error::Step { hint, source, .. } => hint.as_deref().or_else(|| source.hint()),
            _ => None,
        }
    }

    /// Name of the step that failed, if a step failed
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_classification() {
        let err = Error::Step {
            step: "wait-for-sync".to_string(),
            label: "Wait for runtime sync".to_string(),
            source: Box::new(Error::Cancelled),
            hint: None,
        };
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(err.step(), Some("wait-for-sync"));
    }

    #[test]
    fn test_hint_falls_back_to_source() {
        let inner = Error::validation(PreflightCheck::Collision, "taken").with_hint("uninstall it");
        let err = Error::Step {
            step: "s".to_string(),
            label: "S".to_string(),
            source: Box::new(inner),
            hint: None,
        };
        assert_eq!(err.hint(), Some("uninstall it"));
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            what: "git integration to be created".to_string(),
            attempts: 6,
        };
        assert_eq!(
            err.to_string(),
            "timed out while waiting for git integration to be created"
        );
    }

    #[test]
    fn test_with_hint_ignores_other_variants() {
        let err = Error::Cancelled.with_hint("ignored");
        assert_eq!(err.hint(), None);
    }
}
