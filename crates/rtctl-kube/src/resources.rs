//! Applying manifests to the cluster
//!
//! Manifests are multi-document YAML. Every document is resolved through API
//! discovery and applied with Server-Side Apply, so applying the same
//! manifest twice is a no-op.

use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "rtctl";

/// Summary of an apply
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    /// Applied resources, as `[namespace/]Kind/name (created|configured)`
    pub applied: Vec<String>,
    /// Failed resources with errors
    pub failed: Vec<(String, String)>,
}

impl ApplySummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.failed.len()
    }

    /// Turn partial failures into an error
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let details = self
            .failed
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("; ");
        Err(KubeError::ApplyFailed {
            failed: self.failed.len(),
            total: self.total(),
            details,
        })
    }
}

/// Split a multi-document manifest, dropping empty and comment-only documents
pub fn split_documents(manifest: &str) -> Vec<&str> {
    manifest
        .split("\n---")
        .map(|doc| doc.trim_start_matches("---").trim())
        .filter(|doc| {
            !doc.is_empty()
                && !doc
                    .lines()
                    .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        })
        .collect()
}

/// Creation rank of a kind: namespaces and CRDs first, custom resources last
pub fn apply_rank(kind: &str, api_version: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" | "ClusterRole" | "ClusterRoleBinding" | "Role" | "RoleBinding" => 2,
        "Secret" | "ConfigMap" => 3,
        _ if api_version.contains(".k8s.io/") || !api_version.contains('/') => 4,
        "Deployment" | "StatefulSet" | "DaemonSet" | "Service" | "Ingress" => 4,
        _ if api_version.starts_with("apps/") || api_version.starts_with("batch/") => 4,
        _ => 5,
    }
}

#[derive(Debug, Clone)]
struct ParsedResource {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ParsedResource {
    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        match &self.obj.metadata.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, name),
            None => format!("{}/{}", self.gvk.kind, name),
        }
    }

    fn rank(&self) -> u8 {
        let api_version = self
            .obj
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or("v1");
        apply_rank(&self.gvk.kind, api_version)
    }
}

/// Applies manifests with Server-Side Apply
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
}

impl ResourceManager {
    /// Create a manager with fresh discovery information.
    ///
    /// Discovery must be refreshed after CRDs are installed, so managers are
    /// meant to be short lived.
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Apply every document of `manifest`, defaulting namespaced resources
    /// to `namespace`
    pub async fn apply_manifest(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        let mut resources = Vec::new();
        for (index, doc) in split_documents(manifest).into_iter().enumerate() {
            let resource = self.parse_document(doc, namespace).map_err(|e| {
                KubeError::InvalidManifest(format!("document {}: {}", index, e))
            })?;
            resources.push(resource);
        }
        resources.sort_by_key(ParsedResource::rank);

        let mut summary = ApplySummary::default();
        for resource in &resources {
            let name = resource.display_name();
            match self.apply_one(resource).await {
                Ok(created) => {
                    let action = if created { "created" } else { "configured" };
                    tracing::debug!(resource = %name, action, "applied");
                    summary.applied.push(format!("{} ({})", name, action));
                }
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }
        Ok(summary)
    }

    fn parse_document(&self, doc: &str, default_namespace: &str) -> Result<ParsedResource> {
        let mut obj: DynamicObject = serde_yaml::from_str(doc)?;

        let type_meta = obj
            .types
            .as_ref()
            .ok_or_else(|| KubeError::InvalidManifest("missing apiVersion or kind".to_string()))?;
        let gvk = gvk_from_type_meta(type_meta);

        let (api_resource, capabilities) = self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type: {}/{}",
                type_meta.api_version, type_meta.kind
            ))
        })?;

        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = Some(default_namespace.to_string());
        }

        Ok(ParsedResource {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    async fn apply_one(&self, resource: &ParsedResource) -> Result<bool> {
        let name = resource
            .obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::InvalidManifest("missing metadata.name".to_string()))?;

        let api = self.api_for(resource);
        let exists = api.get_opt(name).await?.is_some();

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        api.patch(name, &params, &Patch::Apply(&resource.obj)).await?;

        Ok(!exists)
    }

    fn api_for(&self, resource: &ParsedResource) -> Api<DynamicObject> {
        if resource.capabilities.scope == Scope::Namespaced {
            let ns = resource.obj.metadata.namespace.as_deref().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }
}

/// "apps/v1" -> ("apps", "v1"), "v1" -> ("", "v1")
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_documents() {
        let manifest = "---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: prod\n---\n# only a comment\n---\n\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: runtime-token\n";
        let docs = split_documents(manifest);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("kind: Namespace"));
        assert!(docs[1].contains("kind: Secret"));
    }

    #[test]
    fn test_split_keeps_inline_dashes() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\ndata:\n  key: a---b\n";
        assert_eq!(split_documents(manifest).len(), 1);
    }

    #[test]
    fn test_apply_rank() {
        assert!(apply_rank("Namespace", "v1") < apply_rank("CustomResourceDefinition", "apiextensions.k8s.io/v1"));
        assert!(apply_rank("ClusterRoleBinding", "rbac.authorization.k8s.io/v1") < apply_rank("Secret", "v1"));
        assert!(apply_rank("Secret", "v1") < apply_rank("Deployment", "apps/v1"));
        assert!(apply_rank("Deployment", "apps/v1") < apply_rank("Application", "argoproj.io/v1alpha1"));
    }

    #[test]
    fn test_gvk_from_type_meta() {
        let tm = TypeMeta {
            api_version: "argoproj.io/v1alpha1".to_string(),
            kind: "Application".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "argoproj.io");
        assert_eq!(gvk.version, "v1alpha1");

        let core = gvk_from_type_meta(&TypeMeta {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
        });
        assert_eq!(core.group, "");
    }

    #[test]
    fn test_apply_summary_into_result() {
        let ok = ApplySummary {
            applied: vec!["prod/Secret/a (created)".to_string()],
            failed: vec![],
        };
        assert!(ok.into_result().is_ok());

        let partial = ApplySummary {
            applied: vec!["prod/Secret/a (created)".to_string()],
            failed: vec![("prod/Secret/b".to_string(), "forbidden".to_string())],
        };
        let err = partial.into_result().unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
    }
}
