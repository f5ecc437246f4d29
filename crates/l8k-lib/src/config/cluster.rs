//! Capabilities descriptor: discovered facts about the cluster

use super::{merge_list, merge_map, merge_value, MergeConflict};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node Feature Discovery label present on nodes carrying NVIDIA (Mellanox) NICs
pub const MELLANOX_PCI_LABEL: &str = "feature.node.kubernetes.io/pci-15b3.present";

/// Per-node hardware capability flags; an absent flag reads as `false`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sriov: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdma: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ib: Option<bool>,
}

impl NodeCapabilities {
    pub fn sriov(&self) -> bool {
        self.sriov.unwrap_or(false)
    }

    pub fn rdma(&self) -> bool {
        self.rdma.unwrap_or(false)
    }

    pub fn ib(&self) -> bool {
        self.ib.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCapabilities {
    #[serde(default)]
    pub nodes: NodeCapabilities,
}

/// A physical function model found on the selected nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfConfig {
    pub device_id: String,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

/// Where the network operator currently runs in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorDeployment {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// Discovered cluster configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default)]
    pub capabilities: ClusterCapabilities,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pfs: Vec<PfConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_operator: Option<OperatorDeployment>,
}

impl ClusterConfig {
    /// Empty configuration selecting nodes with NVIDIA NICs
    pub fn with_default_selector() -> Self {
        Self {
            node_selector: BTreeMap::from([(MELLANOX_PCI_LABEL.to_string(), "true".to_string())]),
            ..Default::default()
        }
    }

    /// Fold a provider's partial discovery result into this configuration
    ///
    /// Keys already holding a different value are rejected; identical values
    /// are accepted so a repeated discovery merges cleanly.
    pub fn merge(&mut self, other: ClusterConfig) -> Result<(), MergeConflict> {
        let nodes = &mut self.capabilities.nodes;
        merge_value("capabilities.nodes.sriov", &mut nodes.sriov, other.capabilities.nodes.sriov)?;
        merge_value("capabilities.nodes.rdma", &mut nodes.rdma, other.capabilities.nodes.rdma)?;
        merge_value("capabilities.nodes.ib", &mut nodes.ib, other.capabilities.nodes.ib)?;
        merge_list("pfs", &mut self.pfs, other.pfs)?;
        merge_list("workerNodes", &mut self.worker_nodes, other.worker_nodes)?;
        merge_map("nodeSelector", &mut self.node_selector, other.node_selector)?;
        merge_value("networkOperator", &mut self.network_operator, other.network_operator)
    }
}
