//! Cluster configuration document and the descriptors it carries
//!
//! The document is persisted as YAML and holds:
//! - static operator settings (network operator, SR-IOV, host-device, RDMA shared)
//! - the requirements descriptor (`profile`)
//! - the discovered capabilities descriptor (`clusterConfig`)

mod cluster;
mod document;
mod requirements;

pub use cluster::{
    ClusterCapabilities, ClusterConfig, NodeCapabilities, OperatorDeployment, PfConfig,
    MELLANOX_PCI_LABEL,
};
pub use document::{
    HostdevConfig, LaunchKubernetesConfig, NetworkOperatorConfig, RdmaSharedConfig, SriovConfig,
};
pub use requirements::{features, DeploymentType, Fabric, ParseEnumError, Requirements};

use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;

/// Two partial descriptors disagree on the same key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflicting values for {field}: {existing} vs {incoming}")]
pub struct MergeConflict {
    pub field: String,
    pub existing: String,
    pub incoming: String,
}

impl MergeConflict {
    fn new(field: &str, existing: &impl Debug, incoming: &impl Debug) -> Self {
        Self {
            field: field.to_string(),
            existing: format!("{:?}", existing),
            incoming: format!("{:?}", incoming),
        }
    }
}

/// Set a scalar once; an identical value is accepted again
pub(crate) fn merge_value<T: PartialEq + Debug>(
    field: &str,
    target: &mut Option<T>,
    incoming: Option<T>,
) -> Result<(), MergeConflict> {
    let Some(value) = incoming else {
        return Ok(());
    };
    if let Some(existing) = target.as_ref() {
        if *existing != value {
            return Err(MergeConflict::new(field, existing, &value));
        }
        return Ok(());
    }
    *target = Some(value);
    Ok(())
}

/// Lists are owned as a whole by the first contributor
pub(crate) fn merge_list<T: PartialEq + Debug>(
    field: &str,
    target: &mut Vec<T>,
    incoming: Vec<T>,
) -> Result<(), MergeConflict> {
    if incoming.is_empty() || *target == incoming {
        return Ok(());
    }
    if !target.is_empty() {
        return Err(MergeConflict::new(field, target, &incoming));
    }
    *target = incoming;
    Ok(())
}

pub(crate) fn merge_map<V: PartialEq + Debug>(
    field: &str,
    target: &mut BTreeMap<String, V>,
    incoming: BTreeMap<String, V>,
) -> Result<(), MergeConflict> {
    for (key, value) in incoming {
        match target.get(&key) {
            Some(existing) if *existing != value => {
                return Err(MergeConflict::new(&format!("{}.{}", field, key), existing, &value));
            }
            Some(_) => {}
            None => {
                target.insert(key, value);
            }
        }
    }
    Ok(())
}
