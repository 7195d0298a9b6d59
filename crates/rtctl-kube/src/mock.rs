//! In-memory cluster for testing
//!
//! Records applied manifests and serves canned ingress classes, bindings,
//! deployments and nodes, useful for orchestrator tests without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, NodeStatus};
use k8s_openapi::api::networking::v1::{IngressClass, IngressClassSpec};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::cluster::{Cluster, ServerVersion};
use crate::error::{KubeError, Result};
use crate::resources::{ApplySummary, split_documents};

/// A manifest passed to [`Cluster::apply`]
#[derive(Debug, Clone)]
pub struct AppliedManifest {
    pub namespace: String,
    pub manifest: String,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub applies: usize,
    pub gets: usize,
    pub lists: usize,
    pub deletes: usize,
}

struct MockState {
    ingress_classes: Vec<IngressClass>,
    bindings: HashMap<String, ClusterRoleBinding>,
    deployments: HashMap<(String, String), Deployment>,
    nodes: Vec<Node>,
    version: ServerVersion,
    api_groups: HashSet<String>,
    namespaces: HashSet<String>,
    terminating: HashMap<String, u32>,
    linger: u32,
    applied: Vec<AppliedManifest>,
    fail_apply: Option<String>,
    fail_ingress_classes: Option<String>,
    ops: OperationCounts,
}

/// In-memory cluster
#[derive(Clone)]
pub struct MockCluster {
    server: String,
    state: Arc<RwLock<MockState>>,
}

/// Build a node with the given allocatable CPU and memory
pub fn node(name: &str, cpu: &str, memory: &str) -> Node {
    let mut allocatable = BTreeMap::new();
    allocatable.insert("cpu".to_string(), Quantity(cpu.to_string()));
    allocatable.insert("memory".to_string(), Quantity(memory.to_string()));
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            allocatable: Some(allocatable),
            ..Default::default()
        }),
    }
}

impl MockCluster {
    /// A 1.31 cluster with one node that satisfies the default requirements
    pub fn new() -> Self {
        Self {
            server: "https://127.0.0.1:6443".to_string(),
            state: Arc::new(RwLock::new(MockState {
                ingress_classes: Vec::new(),
                bindings: HashMap::new(),
                deployments: HashMap::new(),
                nodes: vec![node("node-1", "4", "16Gi")],
                version: ServerVersion { major: 1, minor: 31 },
                api_groups: HashSet::new(),
                namespaces: HashSet::new(),
                terminating: HashMap::new(),
                linger: 0,
                applied: Vec::new(),
                fail_apply: None,
                fail_ingress_classes: None,
                ops: OperationCounts::default(),
            })),
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_ingress_class(self, name: &str, controller: &str) -> Self {
        self.state.write().unwrap().ingress_classes.push(IngressClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(IngressClassSpec {
                controller: Some(controller.to_string()),
                ..Default::default()
            }),
        });
        self
    }

    /// Add a cluster role binding whose only subject lives in `subject_namespace`
    pub fn with_cluster_role_binding(self, name: &str, subject_namespace: Option<&str>) -> Self {
        let subjects = subject_namespace.map(|ns| {
            vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: name.to_string(),
                namespace: Some(ns.to_string()),
                ..Default::default()
            }]
        });
        let binding = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: name.to_string(),
            },
            subjects,
        };
        self.state
            .write()
            .unwrap()
            .bindings
            .insert(name.to_string(), binding);
        self
    }

    pub fn with_deployment(self, namespace: &str, name: &str) -> Self {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .write()
            .unwrap()
            .deployments
            .insert((namespace.to_string(), name.to_string()), deployment);
        self
    }

    pub fn with_nodes(self, nodes: Vec<Node>) -> Self {
        self.state.write().unwrap().nodes = nodes;
        self
    }

    pub fn with_version(self, major: u32, minor: u32) -> Self {
        self.state.write().unwrap().version = ServerVersion { major, minor };
        self
    }

    pub fn with_api_group(self, group: &str) -> Self {
        self.state.write().unwrap().api_groups.insert(group.to_string());
        self
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state
            .write()
            .unwrap()
            .namespaces
            .insert(namespace.to_string());
        self
    }

    /// Keep deleted namespaces visible for `polls` existence checks
    pub fn with_namespace_linger(self, polls: u32) -> Self {
        self.state.write().unwrap().linger = polls;
        self
    }

    /// Make every apply fail
    pub fn failing_apply(self, message: &str) -> Self {
        self.state.write().unwrap().fail_apply = Some(message.to_string());
        self
    }

    /// Make listing ingress classes fail
    pub fn failing_ingress_classes(self, message: &str) -> Self {
        self.state.write().unwrap().fail_ingress_classes = Some(message.to_string());
        self
    }

    pub fn applied(&self) -> Vec<AppliedManifest> {
        self.state.read().unwrap().applied.clone()
    }

    /// Whether any applied manifest contains `needle`
    pub fn applied_contains(&self, needle: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .applied
            .iter()
            .any(|a| a.manifest.contains(needle))
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.state.read().unwrap().ops.clone()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cluster for MockCluster {
    fn server_address(&self) -> &str {
        &self.server
    }

    async fn apply(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        let mut state = self.state.write().unwrap();
        state.ops.applies += 1;
        if let Some(message) = &state.fail_apply {
            let total = split_documents(manifest).len();
            return Err(KubeError::ApplyFailed {
                failed: total,
                total,
                details: message.clone(),
            });
        }
        state.applied.push(AppliedManifest {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        state.namespaces.insert(namespace.to_string());
        state.terminating.remove(namespace);
        Ok(ApplySummary {
            applied: split_documents(manifest)
                .iter()
                .map(|d| format!("{} (created)", d.lines().next().unwrap_or_default()))
                .collect(),
            failed: Vec::new(),
        })
    }

    async fn ingress_classes(&self) -> Result<Vec<IngressClass>> {
        let mut state = self.state.write().unwrap();
        state.ops.lists += 1;
        if let Some(message) = &state.fail_ingress_classes {
            return Err(KubeError::IngressClass {
                message: format!("failed to list ingress classes: {message}"),
            });
        }
        Ok(state.ingress_classes.clone())
    }

    async fn cluster_role_binding(&self, name: &str) -> Result<ClusterRoleBinding> {
        let mut state = self.state.write().unwrap();
        state.ops.gets += 1;
        state
            .bindings
            .get(name)
            .cloned()
            .ok_or_else(|| KubeError::not_found("ClusterRoleBinding", name))
    }

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let mut state = self.state.write().unwrap();
        state.ops.gets += 1;
        state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| KubeError::not_found("Deployment", format!("{}/{}", namespace, name)))
    }

    async fn nodes(&self) -> Result<Vec<Node>> {
        let mut state = self.state.write().unwrap();
        state.ops.lists += 1;
        Ok(state.nodes.clone())
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        Ok(self.state.read().unwrap().version)
    }

    async fn has_api_group(&self, group: &str) -> Result<bool> {
        Ok(self.state.read().unwrap().api_groups.contains(group))
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let mut state = self.state.write().unwrap();
        state.ops.gets += 1;
        if state.namespaces.contains(namespace) {
            return Ok(true);
        }
        match state.terminating.get_mut(namespace) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ops.deletes += 1;
        if state.namespaces.remove(namespace) {
            let linger = state.linger;
            state.terminating.insert(namespace.to_string(), linger);
        }
        Ok(())
    }
}
