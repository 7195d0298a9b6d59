//! Error types for rtctl-kube

use thiserror::Error;

/// Result type for rtctl-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Resource not found
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Kubeconfig could not be loaded
    #[error("failed to load kubeconfig: {0}\nHint: Check the --context flag and your KUBECONFIG")]
    Kubeconfig(String),

    /// Some resources of a manifest failed to apply
    #[error("failed to apply {failed} of {total} resource(s): {details}")]
    ApplyFailed {
        failed: usize,
        total: usize,
        details: String,
    },

    /// Ingress class resolution failed
    #[error("{message}")]
    IngressClass { message: String },

    /// Cluster does not meet the minimum requirements
    #[error("cluster does not meet the minimum requirements:\n{reasons}")]
    RequirementsNotMet { reasons: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a not-found error (typed or a 404 from the API)
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        KubeError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}
