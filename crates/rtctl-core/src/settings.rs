//! CLI settings
//!
//! Stored in `~/.config/rtctl/config.yaml`. Every field has a default, so a
//! missing file (or a partial one) is fine.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Control plane API base url
    pub control_plane_url: String,

    /// Base url the runtime definitions are downloaded from
    pub registry_url: String,

    /// Highest definition schema version this client understands
    pub max_def_version: Version,

    pub docs: DocLinks,

    pub wait: WaitSettings,

    pub names: WellKnownNames,

    pub requirements: ClusterRequirements,

    /// Install without ingress unless a host is given
    pub skip_ingress: bool,

    /// Accept any ingress class, even unsupported ones
    pub bypass_ingress_class_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            control_plane_url: "https://g.rtctl.io".to_string(),
            registry_url: "https://github.com/rtctl/runtime/releases".to_string(),
            max_def_version: Version::new(2, 0, 0),
            docs: DocLinks::default(),
            wait: WaitSettings::default(),
            names: WellKnownNames::default(),
            requirements: ClusterRequirements::default(),
            skip_ingress: false,
            bypass_ingress_class_check: false,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Default settings path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("rtctl").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        for (what, poll) in [
            ("wait.runtimeSync", &self.wait.runtime_sync),
            ("wait.gitIntegration", &self.wait.git_integration),
            ("wait.uninstall", &self.wait.uninstall),
        ] {
            poll.check(what)?;
        }
        if self.wait.status_refresh.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "wait.statusRefresh must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Documentation links used in hints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocLinks {
    pub requirements: String,
    pub download_cli: String,
    pub install: String,
}

impl Default for DocLinks {
    fn default() -> Self {
        Self {
            requirements: "https://rtctl.io/docs/runtime/requirements/".to_string(),
            download_cli: "https://rtctl.io/docs/cli/#download".to_string(),
            install: "https://rtctl.io/docs/runtime/installation/".to_string(),
        }
    }
}

/// A bounded poll: `max_attempts` ticks, `interval` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    /// Build a poll budget; a zero interval or zero attempts is rejected
    pub fn new(interval: Duration, max_attempts: u32) -> Result<Self> {
        let poll = Self {
            interval,
            max_attempts,
        };
        poll.check("poll")?;
        Ok(poll)
    }

    /// Reject budgets that cannot tick, naming them `what` in the error
    pub fn check(&self, what: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CoreError::InvalidConfig {
                message: format!("{what}.maxAttempts must be at least 1"),
            });
        }
        if self.interval.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: format!("{what}.interval must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Upper bound on how long the poll can take
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Wait budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitSettings {
    /// Runtime reaching the completed installation status
    pub runtime_sync: PollSettings,

    /// Git integration becoming creatable
    pub git_integration: PollSettings,

    /// Runtime namespace disappearing during uninstall
    pub uninstall: PollSettings,

    /// How often the component status cache is refreshed
    #[serde(with = "humantime_serde")]
    pub status_refresh: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            runtime_sync: PollSettings {
                interval: Duration::from_secs(10),
                max_attempts: 48,
            },
            git_integration: PollSettings {
                interval: Duration::from_secs(10),
                max_attempts: 6,
            },
            uninstall: PollSettings {
                interval: Duration::from_secs(5),
                max_attempts: 60,
            },
            status_refresh: Duration::from_secs(2),
        }
    }
}

/// Names shared between the CLI, the emitted manifests and the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WellKnownNames {
    /// Name of the GitOps server cluster role binding and deployment
    pub argocd_server: String,

    /// Component name reported for the GitOps engine
    pub argocd_component: String,

    pub git_source: String,
    pub marketplace_git_source: String,
    pub marketplace_repo: String,

    pub events_reporter: String,
    pub workflow_reporter: String,
    pub rollout_reporter: String,

    pub token_secret: String,
    pub token_secret_key: String,
    pub store_iv_secret_key: String,

    pub bootstrap_dir: String,
    pub apps_dir: String,
    pub projects_dir: String,

    /// API group that identifies an OpenShift cluster
    pub openshift_security_group: String,
}

impl Default for WellKnownNames {
    fn default() -> Self {
        Self {
            argocd_server: "argocd-server".to_string(),
            argocd_component: "argo-cd".to_string(),
            git_source: "default-git-source".to_string(),
            marketplace_git_source: "marketplace-git-source".to_string(),
            marketplace_repo: "https://github.com/rtctl/argo-hub.git".to_string(),
            events_reporter: "events-reporter".to_string(),
            workflow_reporter: "workflow-reporter".to_string(),
            rollout_reporter: "rollout-reporter".to_string(),
            token_secret: "runtime-token".to_string(),
            token_secret_key: "token".to_string(),
            store_iv_secret_key: "encryptionIV".to_string(),
            bootstrap_dir: "bootstrap".to_string(),
            apps_dir: "apps".to_string(),
            projects_dir: "projects".to_string(),
            openshift_security_group: "security.openshift.io".to_string(),
        }
    }
}

impl WellKnownNames {
    /// Reporters installed alongside every runtime
    pub fn reporters(&self) -> [&str; 3] {
        [
            &self.events_reporter,
            &self.workflow_reporter,
            &self.rollout_reporter,
        ]
    }
}

/// Minimum cluster capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRequirements {
    pub min_nodes: usize,

    /// Minimum allocatable CPU per node, in millicores
    pub min_node_cpu_millis: u64,

    /// Minimum allocatable memory per node, in MiB
    pub min_node_memory_mib: u64,

    /// Minimum Kubernetes minor version (1.x)
    pub min_kube_minor: u32,
}

impl Default for ClusterRequirements {
    fn default() -> Self {
        Self {
            min_nodes: 1,
            min_node_cpu_millis: 2000,
            min_node_memory_mib: 3700,
            min_kube_minor: 20,
        }
    }
}
