//! Control plane client
//!
//! [`ControlPlane`] is the capability the installer depends on;
//! [`HttpControlPlane`] talks to the REST API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::model::{Component, CreatedRuntime, GitIntegrationArgs, Runtime, RuntimeInstallationArgs};

/// Operations on the control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register a new runtime; fails with already-exists for a taken name
    async fn create_runtime(&self, args: &RuntimeInstallationArgs) -> Result<CreatedRuntime>;

    /// Get a runtime; fails with not-found for an unknown name
    async fn get_runtime(&self, name: &str) -> Result<Runtime>;

    async fn list_runtimes(&self) -> Result<Vec<Runtime>>;

    async fn delete_runtime(&self, name: &str) -> Result<()>;

    async fn list_components(&self, runtime: &str) -> Result<Vec<Component>>;

    /// Url of the account's shared configuration repository, if one is set
    async fn shared_config_repo(&self) -> Result<Option<String>>;

    async fn add_git_integration(&self, runtime: &str, args: &GitIntegrationArgs) -> Result<()>;

    /// Register the current user with the runtime's git integration
    async fn register_git_integration(&self, runtime: &str, token: &str) -> Result<()>;

    async fn remove_git_integrations(&self, runtime: &str) -> Result<()>;

    /// Remove the runtime's entries from the shared configuration repository
    async fn remove_runtime_from_shared_config(&self, runtime: &str) -> Result<()>;
}

/// REST client for the control plane
pub struct HttpControlPlane {
    base_url: url::Url,
    token: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    token: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedConfigRepo {
    #[serde(default)]
    repo: Option<String>,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let mut base_url = url::Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Network {
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            token: token.into(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, &self.token))
    }

    /// Send a request, mapping error statuses for the `kind`/`name` it targets
    async fn send(&self, builder: RequestBuilder, kind: &str, name: &str) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        tracing::debug!(%status, %message, "control plane request failed");
        Err(match status {
            StatusCode::NOT_FOUND => PlatformError::not_found(kind, name),
            StatusCode::CONFLICT => PlatformError::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                PlatformError::Unauthorized { message }
            }
            _ => PlatformError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, kind: &str, name: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)?, kind, name).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_runtime(&self, args: &RuntimeInstallationArgs) -> Result<CreatedRuntime> {
        let builder = self.request(Method::POST, "api/runtimes")?.json(args);
        let response = self.send(builder, "runtime", &args.runtime_name).await?;
        Ok(response.json().await?)
    }

    async fn get_runtime(&self, name: &str) -> Result<Runtime> {
        self.get_json(&format!("api/runtimes/{}", name), "runtime", name).await
    }

    async fn list_runtimes(&self) -> Result<Vec<Runtime>> {
        self.get_json("api/runtimes", "runtimes", "").await
    }

    async fn delete_runtime(&self, name: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("api/runtimes/{}", name))?;
        self.send(builder, "runtime", name).await?;
        Ok(())
    }

    async fn list_components(&self, runtime: &str) -> Result<Vec<Component>> {
        self.get_json(&format!("api/runtimes/{}/components", runtime), "runtime", runtime)
            .await
    }

    async fn shared_config_repo(&self) -> Result<Option<String>> {
        let body: SharedConfigRepo = self
            .get_json("api/account/shared-config-repo", "account", "current")
            .await?;
        Ok(body.repo.filter(|r| !r.is_empty()))
    }

    async fn add_git_integration(&self, runtime: &str, args: &GitIntegrationArgs) -> Result<()> {
        let builder = self
            .request(Method::POST, &format!("api/runtimes/{}/git-integrations", runtime))?
            .json(args);
        let name = args.name.as_deref().unwrap_or("default");
        self.send(builder, "git integration", name).await?;
        Ok(())
    }

    async fn register_git_integration(&self, runtime: &str, token: &str) -> Result<()> {
        let builder = self
            .request(
                Method::POST,
                &format!("api/runtimes/{}/git-integrations/register", runtime),
            )?
            .json(&RegisterRequest { token });
        self.send(builder, "runtime", runtime).await?;
        Ok(())
    }

    async fn remove_git_integrations(&self, runtime: &str) -> Result<()> {
        let builder = self.request(
            Method::DELETE,
            &format!("api/runtimes/{}/git-integrations", runtime),
        )?;
        self.send(builder, "runtime", runtime).await?;
        Ok(())
    }

    async fn remove_runtime_from_shared_config(&self, runtime: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("api/runtimes/{}/shared-config", runtime))?;
        self.send(builder, "runtime", runtime).await?;
        Ok(())
    }
}
