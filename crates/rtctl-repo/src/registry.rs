//! Runtime definition registry
//!
//! Definitions are published as `runtime.yaml` release assets:
//! `<base>/latest/download/runtime.yaml` for the latest release and
//! `<base>/download/v<version>/runtime.yaml` for a pinned one.

use async_trait::async_trait;
use rtctl_core::RuntimeDefinition;
use semver::Version;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{RepoError, Result};

/// Source of runtime definitions
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
    /// Download the definition for `runtime`, latest when `version` is unset.
    ///
    /// Fails with [`RepoError::UnsupportedDefinition`] when the definition
    /// schema is newer than this client supports.
    async fn download(&self, runtime: &str, version: Option<&Version>) -> Result<RuntimeDefinition>;
}

fn ensure_supported(def: &RuntimeDefinition, max_def_version: &Version) -> Result<()> {
    if def.is_supported_by(max_def_version) {
        Ok(())
    } else {
        Err(RepoError::UnsupportedDefinition {
            found: def.def_version().to_string(),
            supported: max_def_version.to_string(),
        })
    }
}

/// Registry serving definitions over HTTP
pub struct HttpRegistry {
    base_url: String,
    client: reqwest::Client,
    max_def_version: Version,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, max_def_version: Version) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| RepoError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            max_def_version,
        })
    }

    /// Url of the definition asset
    pub fn definition_url(&self, version: Option<&Version>) -> String {
        match version {
            Some(v) => format!("{}/download/v{}/runtime.yaml", self.base_url, v),
            None => format!("{}/latest/download/runtime.yaml", self.base_url),
        }
    }
}

#[async_trait]
impl DefinitionRegistry for HttpRegistry {
    async fn download(&self, runtime: &str, version: Option<&Version>) -> Result<RuntimeDefinition> {
        let url = self.definition_url(version);
        tracing::debug!(%url, "downloading runtime definition");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepoError::DefinitionNotFound { url });
        }
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("failed to download {}", url),
            });
        }

        let body = response.text().await?;
        let def = RuntimeDefinition::from_yaml(&body)?;
        ensure_supported(&def, &self.max_def_version)?;
        Ok(def.named(runtime))
    }
}

/// Registry over a fixed set of definitions, for tests and offline use
#[derive(Clone)]
pub struct StaticRegistry {
    definitions: Arc<Vec<RuntimeDefinition>>,
    max_def_version: Version,
    downloads: Arc<AtomicUsize>,
}

impl StaticRegistry {
    pub fn new(definitions: Vec<RuntimeDefinition>, max_def_version: Version) -> Self {
        Self {
            definitions: Arc::new(definitions),
            max_def_version,
            downloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DefinitionRegistry for StaticRegistry {
    async fn download(&self, runtime: &str, version: Option<&Version>) -> Result<RuntimeDefinition> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let def = match version {
            Some(v) => self.definitions.iter().find(|d| d.version() == v),
            None => self.definitions.iter().max_by(|a, b| a.version().cmp(b.version())),
        }
        .ok_or_else(|| RepoError::DefinitionNotFound {
            url: format!(
                "static://{}",
                version.map(|v| v.to_string()).unwrap_or_else(|| "latest".to_string())
            ),
        })?;

        ensure_supported(def, &self.max_def_version)?;
        Ok(def.clone().named(runtime))
    }
}
