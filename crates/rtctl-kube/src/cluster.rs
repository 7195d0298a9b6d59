//! Cluster access
//!
//! [`Cluster`] is everything the installer needs from the target cluster.
//! [`KubeCluster`] implements it on top of a kube-rs client.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::api::networking::v1::IngressClass;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::{
    Client,
    api::{Api, DeleteParams, ListParams},
    config::KubeConfigOptions,
};

use crate::error::{KubeError, Result};
use crate::resources::{ApplySummary, ResourceManager};

/// Kubernetes server version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

/// Operations the installer performs against the target cluster
#[async_trait]
pub trait Cluster: Send + Sync {
    /// API server url of the selected context
    fn server_address(&self) -> &str;

    /// Apply a multi-document manifest; fails if any resource fails
    async fn apply(&self, namespace: &str, manifest: &str) -> Result<ApplySummary>;

    async fn ingress_classes(&self) -> Result<Vec<IngressClass>>;

    /// Get a cluster role binding; a missing one is a not-found error
    async fn cluster_role_binding(&self, name: &str) -> Result<ClusterRoleBinding>;

    /// Get a deployment; a missing one is a not-found error
    async fn deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    async fn nodes(&self) -> Result<Vec<Node>>;

    async fn server_version(&self) -> Result<ServerVersion>;

    /// Whether the cluster serves the given API group
    async fn has_api_group(&self, group: &str) -> Result<bool>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Delete a namespace; deleting a missing namespace is not an error
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Cluster backed by a kube-rs client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    server: String,
}

impl KubeCluster {
    /// Connect using the kubeconfig, optionally selecting a context
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };
        let config = kube::Config::from_kubeconfig(&options)
            .await
            .map_err(|e| KubeError::Kubeconfig(e.to_string()))?;
        let server = config.cluster_url.to_string();
        let client = Client::try_from(config)?;

        tracing::debug!(%server, context = ?context, "connected to cluster");
        Ok(Self { client, server })
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    fn server_address(&self) -> &str {
        &self.server
    }

    async fn apply(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        let manager = ResourceManager::new(self.client.clone()).await?;
        manager.apply_manifest(namespace, manifest).await?.into_result()
    }

    async fn ingress_classes(&self) -> Result<Vec<IngressClass>> {
        let api: Api<IngressClass> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn cluster_role_binding(&self, name: &str) -> Result<ClusterRoleBinding> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.get_opt(name)
            .await?
            .ok_or_else(|| KubeError::not_found("ClusterRoleBinding", name))
    }

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await?
            .ok_or_else(|| KubeError::not_found("Deployment", format!("{}/{}", namespace, name)))
    }

    async fn nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        let info = self.client.apiserver_version().await?;
        Ok(ServerVersion {
            major: leading_number(&info.major),
            minor: leading_number(&info.minor),
        })
    }

    async fn has_api_group(&self, group: &str) -> Result<bool> {
        let groups = self.client.list_api_groups().await?;
        Ok(groups.groups.iter().any(|g| g.name == group))
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.is_some())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(namespace, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// "31+" -> 31
fn leading_number(s: &str) -> u32 {
    s.chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("31"), 31);
        assert_eq!(leading_number("27+"), 27);
        assert_eq!(leading_number(""), 0);
    }
}
