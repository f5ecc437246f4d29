//! Requirements descriptor: the desired networking state

use super::{merge_map, merge_value, MergeConflict};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Well-known feature flag names
pub mod features {
    pub const MULTIRAIL: &str = "multirail";
    pub const SPECTRUM_X: &str = "spectrumX";
    pub const AI: &str = "ai";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported {kind} '{value}', expected one of: {expected}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Network fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fabric {
    Ethernet,
    Infiniband,
}

impl Fabric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fabric::Ethernet => "ethernet",
            Fabric::Infiniband => "infiniband",
        }
    }
}

impl fmt::Display for Fabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fabric {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethernet" | "eth" => Ok(Fabric::Ethernet),
            "infiniband" | "ib" => Ok(Fabric::Infiniband),
            _ => Err(ParseEnumError {
                kind: "fabric",
                value: s.to_string(),
                expected: "ethernet, infiniband",
            }),
        }
    }
}

/// How secondary networks are attached to workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentType {
    Sriov,
    Hostdev,
    RdmaShared,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Sriov => "sriov",
            DeploymentType::Hostdev => "hostdev",
            DeploymentType::RdmaShared => "rdma-shared",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sriov" | "sr-iov" => Ok(DeploymentType::Sriov),
            "hostdev" | "host-device" => Ok(DeploymentType::Hostdev),
            "rdma-shared" | "rdma_shared" => Ok(DeploymentType::RdmaShared),
            _ => Err(ParseEnumError {
                kind: "deployment type",
                value: s.to_string(),
                expected: "sriov, hostdev, rdma-shared",
            }),
        }
    }
}

/// Desired networking state driving profile selection
///
/// Feature flags are stored flat next to `fabric` and `deployment`, so the
/// persisted form reads `{fabric, deployment, multirail, spectrumX, ai}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<Fabric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentType>,
    #[serde(flatten)]
    pub features: BTreeMap<String, bool>,
}

impl Requirements {
    /// Feature flag value; an absent flag reads as `false`
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: bool) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fabric.is_none() && self.deployment.is_none() && self.features.is_empty()
    }

    /// Fold another provider's partial requirements into this one
    pub fn merge(&mut self, other: Requirements) -> Result<(), MergeConflict> {
        merge_value("fabric", &mut self.fabric, other.fabric)?;
        merge_value("deployment", &mut self.deployment, other.deployment)?;
        merge_map("features", &mut self.features, other.features)
    }
}
