//! Requests for install, uninstall and upgrade operations

use regex::Regex;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{CoreError, Result};

/// Maximum length of a runtime name (it doubles as a namespace name)
pub const MAX_RUNTIME_NAME_LEN: usize = 63;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("runtime name pattern is valid")
    })
}

/// Validate a runtime name.
///
/// The name is used as the runtime namespace, so it must be a DNS-1123 label
/// that starts with a letter.
pub fn validate_runtime_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| CoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_RUNTIME_NAME_LEN {
        return Err(invalid("name must be no more than 63 characters"));
    }
    if !name_pattern().is_match(name) {
        return Err(invalid(
            "name must start with a lower case letter and contain only lower case letters, digits and '-'",
        ));
    }
    Ok(())
}

/// Ingress parameters
#[derive(Debug, Clone, Default)]
pub struct IngressParams {
    /// Externally reachable ingress url or host
    pub host: String,

    /// Host used by the control plane to reach the runtime, defaults to `host`
    pub internal_host: Option<String>,

    /// Requested ingress class; resolved from the cluster when empty
    pub class: Option<String>,

    /// Do not create any ingress resource
    pub skip_ingress: bool,

    pub internal_annotations: BTreeMap<String, String>,
    pub external_annotations: BTreeMap<String, String>,
}

/// Location of the installation repository
#[derive(Debug, Clone, Default)]
pub struct RepoLocation {
    /// Clone url of the installation repository
    pub url: String,

    /// Git provider kind ("github", "gitlab", "bitbucket-server", ...)
    pub provider: Option<String>,

    /// Provider API url, for self-hosted providers
    pub api_url: Option<String>,

    /// Personal git token registered with the default git integration.
    /// Never persisted.
    pub token: Option<String>,
}

/// Flags controlling an installation
#[derive(Debug, Clone, Default)]
pub struct InstallFlags {
    pub skip_cluster_checks: bool,

    pub disable_rollback: bool,

    /// Recover a runtime from the state kept in its repository
    pub from_repo: bool,

    /// Create the demo resources in the git source
    pub demo_resources: bool,

    /// Never prompt
    pub silent: bool,

    /// Do not wait for the git integration to become available
    pub skip_git_integration: bool,
}

/// Options for installing a runtime
#[derive(Debug, Clone, Default)]
pub struct InstallationRequest {
    /// Runtime name (also the runtime namespace)
    pub name: String,

    /// Requested runtime version; latest when unset
    pub version: Option<Version>,

    pub ingress: IngressParams,

    pub repo: RepoLocation,

    /// Kubeconfig context; current context when unset
    pub kube_context: Option<String>,

    pub flags: InstallFlags,

    /// Labels added to the runtime namespace
    pub namespace_labels: BTreeMap<String, String>,
}

impl InstallationRequest {
    /// Create a request for a runtime installed from the given repository
    pub fn new(name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: RepoLocation {
                url: repo_url.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Pin the runtime version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the ingress host and, optionally, the ingress class
    pub fn with_ingress(mut self, host: impl Into<String>, class: Option<String>) -> Self {
        self.ingress.host = host.into();
        self.ingress.class = class;
        self
    }

    /// Install without creating ingress resources
    pub fn without_ingress(mut self) -> Self {
        self.ingress.skip_ingress = true;
        self
    }

    /// Set the git provider kind
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.repo.provider = Some(provider.into());
        self
    }

    /// Use a specific kubeconfig context
    pub fn with_kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    /// Recover the runtime from its repository.
    ///
    /// Recovery never rolls back, the repository is the source of truth.
    pub fn from_repo(mut self) -> Self {
        self.flags.from_repo = true;
        self.flags.disable_rollback = true;
        self
    }

    /// Keep whatever was created when the installation fails
    pub fn without_rollback(mut self) -> Self {
        self.flags.disable_rollback = true;
        self
    }

    /// Skip the cluster requirements check
    pub fn skip_cluster_checks(mut self) -> Self {
        self.flags.skip_cluster_checks = true;
        self
    }

    /// Never prompt
    pub fn silent(mut self) -> Self {
        self.flags.silent = true;
        self
    }

    /// Host the control plane uses to reach the runtime
    pub fn internal_host(&self) -> &str {
        self.ingress
            .internal_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.ingress.host)
    }

    /// Whether a failed installation may be compensated by an uninstall
    pub fn rollback_enabled(&self) -> bool {
        !self.flags.disable_rollback && !self.flags.from_repo
    }

    /// Validate the request before any remote call
    pub fn validate(&self) -> Result<()> {
        validate_runtime_name(&self.name)?;
        if self.repo.url.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "repo".to_string(),
            });
        }
        if !self.ingress.skip_ingress && self.ingress.host.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "ingress-host".to_string(),
            });
        }
        Ok(())
    }
}

/// Options for uninstalling a runtime
#[derive(Debug, Clone, Default)]
pub struct UninstallRequest {
    pub name: String,

    /// Do not check that the runtime exists on the control plane
    pub skip_checks: bool,

    /// Keep going when a cleanup step fails
    pub force: bool,

    pub kube_context: Option<String>,
}

impl UninstallRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Uninstall with `--force --skip-checks`, as rollback does
    pub fn forced(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skip_checks: true,
            force: true,
            kube_context: None,
        }
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_skip_checks(mut self) -> Self {
        self.skip_checks = true;
        self
    }
}

/// Options for upgrading a runtime
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub name: String,

    /// Target version; latest when unset
    pub version: Option<Version>,
}

impl UpgradeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }
}

/// Extract the host name from an ingress url.
///
/// Accepts bare hosts as well as urls; strips scheme, path and port.
pub fn ingress_host_name(ingress: &str) -> String {
    let without_scheme = ingress
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(ingress);
    let authority = without_scheme.split('/').next().unwrap_or_default();

    // IPv6 literal
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_string();
    }

    authority
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority)
        .to_string()
}

/// Host of a repository url, port included when one is given.
///
/// `https://git.acme.io:8443/acme/isc` and `https://git.acme.io/acme/isc`
/// are different git providers.
pub fn repo_host(repo: &str) -> String {
    let without_scheme = repo.split_once("://").map(|(_, rest)| rest).unwrap_or(repo);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let authority = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    authority.to_ascii_lowercase()
}
