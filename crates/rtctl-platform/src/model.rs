//! Control plane data model

use serde::{Deserialize, Serialize};

/// Installation status reported by the control plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl InstallationStatus {
    /// The runtime finished installing and reports back
    pub fn is_completed(&self) -> bool {
        matches!(self, InstallationStatus::Completed)
    }
}

impl std::fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstallationStatus::Pending => "PENDING",
            InstallationStatus::InProgress => "IN_PROGRESS",
            InstallationStatus::Completed => "COMPLETED",
            InstallationStatus::Failed => "FAILED",
            InstallationStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// A runtime as known to the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub name: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub cluster: Option<String>,

    #[serde(default)]
    pub runtime_version: Option<String>,

    #[serde(default)]
    pub installation_status: InstallationStatus,

    #[serde(default)]
    pub sync_status: Option<String>,

    #[serde(default)]
    pub health_status: Option<String>,

    #[serde(default)]
    pub health_message: Option<String>,

    #[serde(default)]
    pub ingress_host: Option<String>,

    #[serde(default)]
    pub ingress_class: Option<String>,

    #[serde(default)]
    pub repo: Option<String>,

    /// Hosted runtimes are managed by the control plane itself
    #[serde(default)]
    pub managed: bool,
}

/// Status of a runtime component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub sync_status: Option<String>,

    #[serde(default)]
    pub health_status: Option<String>,

    #[serde(default)]
    pub health_message: Option<String>,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl Component {
    pub fn is_healthy(&self) -> bool {
        self.health_status.as_deref() == Some("HEALTHY") && self.errors.is_empty()
    }
}

/// Arguments for creating a runtime on the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInstallationArgs {
    pub runtime_name: String,
    pub cluster: String,
    pub runtime_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_ingress_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_controller: Option<String>,

    pub component_names: Vec<String>,

    pub repo: String,

    /// Recovering an existing runtime from its repository
    pub recover: bool,
}

/// Control plane response to runtime creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRuntime {
    /// Token the runtime uses to report back to the control plane
    pub new_access_token: String,
}

/// Arguments for creating a git integration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitIntegrationArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}
