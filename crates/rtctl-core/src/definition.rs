//! Runtime definition
//!
//! A runtime definition is the versioned description of every component a
//! runtime is made of, together with the cluster, ingress and repository
//! bindings resolved at install time. It is downloaded from the definition
//! registry, bound in memory while the installation progresses, and then
//! persisted into the installation repository.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// API version written into every persisted definition
pub const DEFINITION_API_VERSION: &str = "rtctl.io/v1";

/// Kind written into every persisted definition
pub const DEFINITION_KIND: &str = "Runtime";

/// Versioned runtime definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDefinition {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: DefinitionMetadata,

    pub spec: RuntimeSpec,
}

fn default_api_version() -> String {
    DEFINITION_API_VERSION.to_string()
}

fn default_kind() -> String {
    DEFINITION_KIND.to_string()
}

/// Definition metadata, filled in once the runtime name is known
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Definition body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    /// Version of the definition schema itself
    pub def_version: Version,

    /// Semantic version of the runtime
    pub version: Version,

    /// Source of the bootstrap manifests
    pub bootstrap_specifier: String,

    /// Components, in installation order
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_host: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_ingress_host: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_class: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_controller: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
}

/// A single runtime component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub name: String,

    /// Internal components are managed by the runtime itself and never get an
    /// application of their own in the repository
    #[serde(default)]
    pub is_internal: bool,

    /// Source reference (kustomize-style specifier)
    pub url: String,
}

/// Cluster, ingress and repository bindings resolved during installation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub cluster: String,
    pub ingress_host: String,
    pub internal_ingress_host: String,
    pub ingress_class: String,
    pub ingress_controller: String,
    pub repo: String,
}

impl RuntimeDefinition {
    /// Parse a definition from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(content)?;
        def.validate()?;
        Ok(def)
    }

    /// Load a definition from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.kind != DEFINITION_KIND {
            return Err(CoreError::InvalidDefinition {
                message: format!("expected kind '{}', got '{}'", DEFINITION_KIND, self.kind),
            });
        }
        if self.spec.bootstrap_specifier.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "spec.bootstrapSpecifier".to_string(),
            });
        }
        if let Some(c) = self.spec.components.iter().find(|c| c.name.is_empty()) {
            return Err(CoreError::InvalidDefinition {
                message: format!("component with url '{}' has no name", c.url),
            });
        }
        Ok(())
    }

    /// Bind the definition to a runtime name; the runtime namespace is the name
    pub fn named(mut self, runtime: &str) -> Self {
        self.metadata.name = runtime.to_string();
        self.metadata.namespace = Some(runtime.to_string());
        self
    }

    /// Runtime name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Runtime semantic version
    pub fn version(&self) -> &Version {
        &self.spec.version
    }

    /// Definition schema version
    pub fn def_version(&self) -> &Version {
        &self.spec.def_version
    }

    /// Whether this client can handle the definition's schema
    pub fn is_supported_by(&self, max_def_version: &Version) -> bool {
        self.spec.def_version <= *max_def_version
    }

    /// Bootstrap specifier pinned to the runtime version
    pub fn full_specifier(&self) -> String {
        pin_ref(&self.spec.bootstrap_specifier, &self.spec.version)
    }

    /// Component source pinned to the runtime version
    pub fn component_specifier(&self, component: &ComponentDescriptor) -> String {
        pin_ref(&component.url, &self.spec.version)
    }

    /// Components that get an application of their own
    pub fn external_components(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.spec.components.iter().filter(|c| !c.is_internal)
    }

    /// Current bindings
    pub fn bindings(&self) -> Bindings {
        Bindings {
            cluster: self.spec.cluster.clone(),
            ingress_host: self.spec.ingress_host.clone(),
            internal_ingress_host: self.spec.internal_ingress_host.clone(),
            ingress_class: self.spec.ingress_class.clone(),
            ingress_controller: self.spec.ingress_controller.clone(),
            repo: self.spec.repo.clone(),
        }
    }

    /// Overwrite the bindings
    pub fn bind(&mut self, bindings: &Bindings) {
        self.spec.cluster = bindings.cluster.clone();
        self.spec.ingress_host = bindings.ingress_host.clone();
        self.spec.internal_ingress_host = bindings.internal_ingress_host.clone();
        self.spec.ingress_class = bindings.ingress_class.clone();
        self.spec.ingress_controller = bindings.ingress_controller.clone();
        self.spec.repo = bindings.repo.clone();
    }

    /// Produce the upgraded definition and the components that must be
    /// (re)created for it.
    ///
    /// The upgraded definition keeps this definition's name and bindings. A
    /// component needs creating when it is external and either absent from
    /// this definition or sourced from a different url.
    pub fn upgrade_to(&self, newer: &RuntimeDefinition) -> Result<(RuntimeDefinition, Vec<ComponentDescriptor>)> {
        if newer.spec.version <= self.spec.version {
            return Err(CoreError::InvalidDefinition {
                message: format!(
                    "current runtime version ({}) is greater than or equal to the specified version ({})",
                    self.spec.version, newer.spec.version
                ),
            });
        }

        let mut upgraded = newer.clone();
        upgraded.metadata = self.metadata.clone();
        upgraded.bind(&self.bindings());

        let changed = newer
            .external_components()
            .filter(|candidate| {
                !self
                    .spec
                    .components
                    .iter()
                    .any(|c| c.name == candidate.name && c.url == candidate.url)
            })
            .cloned()
            .collect();

        Ok((upgraded, changed))
    }
}

fn pin_ref(specifier: &str, version: &Version) -> String {
    if specifier.contains("?ref=") || specifier.contains("&ref=") {
        return specifier.to_string();
    }
    let sep = if specifier.contains('?') { '&' } else { '?' };
    format!("{specifier}{sep}ref=v{version}")
}
