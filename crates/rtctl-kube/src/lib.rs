//! rtctl Kube - Kubernetes integration for rtctl
//!
//! This crate provides:
//! - **Cluster**: the operations the installer needs from the target cluster
//! - **Resources**: Server-Side Apply of multi-document manifests
//! - **Ingress**: supported ingress controllers and ingress class selection
//! - **Requirements**: minimum cluster capability checks
//! - **Mock**: an in-memory cluster for tests

pub mod cluster;
pub mod error;
pub mod ingress;
pub mod mock;
pub mod requirements;
pub mod resources;

pub use cluster::{Cluster, KubeCluster, ServerVersion};
pub use error::{KubeError, Result};
pub use ingress::{
    IngressClassInfo, IngressController, IngressSelection, MERGEABLE_INGRESS_TYPE, select_ingress_class,
    usable_classes,
};
pub use mock::{AppliedManifest, MockCluster, OperationCounts, node};
pub use requirements::{ensure_requirements, parse_cpu_millis, parse_memory_mib, unmet_requirements};
pub use resources::{ApplySummary, FIELD_MANAGER, ResourceManager, split_documents};
