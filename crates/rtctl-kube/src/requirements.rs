//! Minimum cluster requirements

use k8s_openapi::api::core::v1::Node;
use rtctl_core::ClusterRequirements;

use crate::cluster::{Cluster, ServerVersion};
use crate::error::{KubeError, Result};

/// Parse a CPU quantity into millicores ("2", "1500m", "0.5")
pub fn parse_cpu_millis(quantity: &str) -> Option<u64> {
    let q = quantity.trim();
    if let Some(millis) = q.strip_suffix('m') {
        return millis.parse().ok();
    }
    q.parse::<f64>().ok().map(|cores| (cores * 1000.0).round() as u64)
}

/// Parse a memory quantity into MiB ("3880Mi", "4Gi", "4096000Ki", "4G", "4000000000")
pub fn parse_memory_mib(quantity: &str) -> Option<u64> {
    const MIB: f64 = 1024.0 * 1024.0;
    let q = quantity.trim();
    let split = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);
    let value: f64 = number.parse().ok()?;
    let bytes = match suffix {
        "" => value,
        "Ki" => value * 1024.0,
        "Mi" => value * MIB,
        "Gi" => value * MIB * 1024.0,
        "Ti" => value * MIB * 1024.0 * 1024.0,
        "k" => value * 1e3,
        "M" => value * 1e6,
        "G" => value * 1e9,
        "T" => value * 1e12,
        _ => return None,
    };
    Some((bytes / MIB).floor() as u64)
}

fn allocatable(node: &Node, resource: &str) -> Option<String> {
    node.status
        .as_ref()?
        .allocatable
        .as_ref()?
        .get(resource)
        .map(|q| q.0.clone())
}

/// Collect every unmet requirement; empty means the cluster qualifies
pub fn unmet_requirements(
    nodes: &[Node],
    version: ServerVersion,
    req: &ClusterRequirements,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if version.major == 1 && version.minor < req.min_kube_minor {
        reasons.push(format!(
            "Kubernetes version 1.{} is older than the minimum 1.{}",
            version.minor, req.min_kube_minor
        ));
    }

    if nodes.len() < req.min_nodes {
        reasons.push(format!(
            "cluster has {} node(s), at least {} required",
            nodes.len(),
            req.min_nodes
        ));
    }

    for node in nodes {
        let name = node.metadata.name.as_deref().unwrap_or("unnamed");
        let cpu = allocatable(node, "cpu").as_deref().and_then(parse_cpu_millis).unwrap_or(0);
        let memory = allocatable(node, "memory")
            .as_deref()
            .and_then(parse_memory_mib)
            .unwrap_or(0);

        if cpu < req.min_node_cpu_millis {
            reasons.push(format!(
                "node '{}' has {}m allocatable CPU, at least {}m required",
                name, cpu, req.min_node_cpu_millis
            ));
        }
        if memory < req.min_node_memory_mib {
            reasons.push(format!(
                "node '{}' has {}Mi allocatable memory, at least {}Mi required",
                name, memory, req.min_node_memory_mib
            ));
        }
    }

    reasons
}

/// Check the cluster against the minimum requirements
pub async fn ensure_requirements(cluster: &dyn Cluster, req: &ClusterRequirements) -> Result<()> {
    let version = cluster.server_version().await?;
    let nodes = cluster.nodes().await?;
    let reasons = unmet_requirements(&nodes, version, req);
    if reasons.is_empty() {
        return Ok(());
    }
    Err(KubeError::RequirementsNotMet {
        reasons: reasons
            .iter()
            .map(|r| format!("  - {}", r))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}
