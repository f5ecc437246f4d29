//! Cluster collaborator: capability discovery and manifest apply
//!
//! Providers talk to the cluster only through [`ClusterApi`]. The label and
//! manifest helpers here are pure so discovery logic is testable without an
//! API server; [`KubeCluster`] wires them to a live cluster.

mod kube;

pub use self::kube::KubeCluster;

use crate::config::{ClusterConfig, OperatorDeployment, PfConfig};
use anyhow::{Context, Result};
use ::kube::api::DynamicObject;
use async_trait::async_trait;
use serde::Deserialize as _;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// NVIDIA (Mellanox) PCI vendor id
pub const MELLANOX_VENDOR_ID: &str = "15b3";

/// Node Feature Discovery label marking SR-IOV capable NICs
pub const SRIOV_CAPABLE_LABEL: &str = "feature.node.kubernetes.io/network-sriov.capable";

/// Node Feature Discovery label marking RDMA capable NICs
pub const RDMA_CAPABLE_LABEL: &str = "feature.node.kubernetes.io/rdma.capable";

/// PCI class of InfiniBand controllers
const INFINIBAND_PCI_CLASS: &str = "0207";

const PCI_LABEL_PREFIX: &str = "feature.node.kubernetes.io/pci-";
const PCI_LABEL_SUFFIX: &str = ".present";

/// Live cluster operations used by providers
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Discover node capabilities and the operator deployment in `namespace`
    async fn discover(&self, namespace: &str) -> Result<ClusterConfig>;

    /// Apply every manifest in `manifests_dir`; returns the number of applied objects
    async fn apply(&self, manifests_dir: &Path) -> Result<usize>;
}

/// PCI device advertised by an NFD label of the form `pci-<class>_<vendor>_<device>.present`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDevice {
    pub class: String,
    pub vendor: String,
    pub device: Option<String>,
}

/// Parse an NFD PCI label key; returns `None` for unrelated labels
pub fn parse_pci_label(key: &str) -> Option<PciDevice> {
    let fields = key
        .strip_prefix(PCI_LABEL_PREFIX)?
        .strip_suffix(PCI_LABEL_SUFFIX)?;

    let parts: Vec<&str> = fields.split('_').collect();
    match parts.as_slice() {
        [class, vendor] => Some(PciDevice {
            class: class.to_string(),
            vendor: vendor.to_string(),
            device: None,
        }),
        [class, vendor, device] => Some(PciDevice {
            class: class.to_string(),
            vendor: vendor.to_string(),
            device: Some(device.to_string()),
        }),
        _ => None,
    }
}

fn label_is_true(labels: &BTreeMap<String, String>, key: &str) -> bool {
    labels.get(key).map(|v| v == "true").unwrap_or(false)
}

/// Derive capabilities, worker nodes and PFs from the labels of the selected nodes
///
/// A capability is reported only when every selected node has it.
pub fn summarize_nodes<'a, I>(nodes: I) -> ClusterConfig
where
    I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, String>)>,
{
    let mut config = ClusterConfig::default();
    let mut pfs: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    let (mut sriov, mut rdma, mut ib) = (true, true, true);

    for (name, labels) in nodes {
        config.worker_nodes.push(name.to_string());
        sriov &= label_is_true(labels, SRIOV_CAPABLE_LABEL);
        rdma &= label_is_true(labels, RDMA_CAPABLE_LABEL);

        let mut node_ib = false;
        for (key, value) in labels {
            if value != "true" {
                continue;
            }
            let Some(device) = parse_pci_label(key) else {
                continue;
            };
            if device.vendor != MELLANOX_VENDOR_ID {
                continue;
            }
            node_ib |= device.class == INFINIBAND_PCI_CLASS;
            if let Some(device_id) = device.device {
                pfs.entry((device.vendor, device_id))
                    .or_default()
                    .push(name.to_string());
            }
        }
        ib &= node_ib;
    }

    if !config.worker_nodes.is_empty() {
        config.worker_nodes.sort();
        let nodes = &mut config.capabilities.nodes;
        nodes.sriov = Some(sriov);
        nodes.rdma = Some(rdma);
        nodes.ib = Some(ib);
    }

    config.pfs = pfs
        .into_iter()
        .map(|((vendor, device_id), mut nodes)| {
            nodes.sort();
            nodes.dedup();
            PfConfig {
                device_id,
                vendor,
                nodes,
            }
        })
        .collect();

    config
}

/// Split a container image reference into `(repository, tag)`
pub fn parse_image(image: &str) -> (String, Option<String>) {
    let without_digest = image.split('@').next().unwrap_or(image);
    let (path, tag) = match without_digest.rsplit_once(':') {
        Some((path, tag)) if !tag.contains('/') => (path, Some(tag.to_string())),
        _ => (without_digest, None),
    };
    let repository = path.rsplit_once('/').map(|(repo, _)| repo).unwrap_or(path);
    (repository.to_string(), tag)
}

/// Operator coordinates derived from its controller image
pub fn operator_deployment(namespace: &str, image: Option<&str>) -> OperatorDeployment {
    let (repository, version) = match image {
        Some(image) => {
            let (repository, version) = parse_image(image);
            (Some(repository), version)
        }
        None => (None, None),
    };
    OperatorDeployment {
        namespace: namespace.to_string(),
        version,
        repository,
    }
}

/// Manifest files in `dir`, sorted by name
pub fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read manifests directory {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("Failed to read manifests directory {}", dir.display()))?
            .path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every object from the manifest files in `dir`
pub fn read_manifests(dir: &Path) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for file in manifest_files(dir)? {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read manifest {}", file.display()))?;

        for document in serde_yaml::Deserializer::from_str(&content) {
            let value = serde_yaml::Value::deserialize(document)
                .with_context(|| format!("Failed to parse manifest {}", file.display()))?;
            if value.is_null() {
                continue;
            }
            let object: DynamicObject = serde_yaml::from_value(value)
                .with_context(|| format!("Invalid Kubernetes object in {}", file.display()))?;
            objects.push(object);
        }
    }
    Ok(objects)
}
