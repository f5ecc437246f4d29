//! Persisted cluster configuration document

use super::{ClusterConfig, DeploymentType, Requirements};
use crate::error::LaunchError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOperatorConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub component_version: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SriovConfig {
    #[serde(default)]
    pub ethernet_mtu: u32,
    #[serde(default)]
    pub infiniband_mtu: u32,
    #[serde(default)]
    pub num_vfs: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub network_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostdevConfig {
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub network_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdmaSharedConfig {
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub network_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_range: Option<String>,
}

/// The full launch configuration: static settings, requirements and discovered state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchKubernetesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_operator: Option<NetworkOperatorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sriov: Option<SriovConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostdev: Option<HostdevConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdma_shared: Option<RdmaSharedConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_config: Option<ClusterConfig>,
}

impl LaunchKubernetesConfig {
    /// Load a configuration document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LaunchError::configuration(
                "no cluster configuration path provided",
            ));
        }
        if !path.exists() {
            return Err(LaunchError::configuration(format!(
                "cluster configuration file {} does not exist",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LaunchError::configuration(format!(
                "failed to read cluster config {}: {}",
                path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            debug!(path = %path.display(), "Cluster configuration is empty");
            return Ok(Self::default());
        }

        let config = serde_yaml::from_str(&content).map_err(|e| {
            LaunchError::configuration(format!(
                "failed to parse cluster config YAML {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "Loaded cluster configuration");
        Ok(config)
    }

    /// Write the document as YAML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LaunchError> {
        let path = path.as_ref();
        let data = serde_yaml::to_string(self).map_err(|e| {
            LaunchError::configuration(format!("failed to serialize cluster config: {}", e))
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LaunchError::configuration(format!(
                    "failed to create output directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(path, data).map_err(|e| {
            LaunchError::configuration(format!(
                "failed to write cluster config to {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), "Cluster configuration saved");
        Ok(())
    }

    /// Check the static settings a deployment type needs for rendering
    pub fn validate_for(&self, deployment: DeploymentType) -> Result<(), LaunchError> {
        let operator = self
            .network_operator
            .as_ref()
            .ok_or_else(|| missing("networkOperator"))?;
        require(&operator.repository, "networkOperator.repository")?;
        require(&operator.component_version, "networkOperator.componentVersion")?;
        require(&operator.namespace, "networkOperator.namespace")?;

        match deployment {
            DeploymentType::Sriov => {
                let sriov = self.sriov.as_ref().ok_or_else(|| missing("sriov"))?;
                require(&sriov.resource_name, "sriov.resourceName")?;
                require(&sriov.network_name, "sriov.networkName")?;
            }
            DeploymentType::Hostdev => {
                let hostdev = self.hostdev.as_ref().ok_or_else(|| missing("hostdev"))?;
                require(&hostdev.resource_name, "hostdev.resourceName")?;
                require(&hostdev.network_name, "hostdev.networkName")?;
            }
            DeploymentType::RdmaShared => {
                let rdma = self
                    .rdma_shared
                    .as_ref()
                    .ok_or_else(|| missing("rdmaShared"))?;
                require(&rdma.resource_name, "rdmaShared.resourceName")?;
            }
        }

        Ok(())
    }
}

fn missing(key: &str) -> LaunchError {
    LaunchError::configuration(format!("{} is required", key))
}

fn require(value: &str, key: &str) -> Result<(), LaunchError> {
    if value.trim().is_empty() {
        return Err(missing(key));
    }
    Ok(())
}
