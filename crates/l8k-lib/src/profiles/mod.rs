//! Profile catalog and first-match resolution
//!
//! A profile declares predicates over the requirements and the discovered
//! node capabilities. Undeclared predicates are wildcards. Resolution walks
//! the provider's catalog entries in directory-name order and returns the
//! first entry whose declared predicates all hold; catalog authors order
//! entries by specificity.

mod catalog;

pub use catalog::{Catalog, CatalogEntry, PROFILE_MANIFEST};

use crate::config::{ClusterCapabilities, DeploymentType, Fabric, Requirements};
use crate::error::LaunchError;
use crate::options::DEFAULT_PROVIDER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Constraints on the requirements descriptor; `None` means "don't care"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementPredicates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<Fabric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentType>,
    #[serde(flatten)]
    pub features: BTreeMap<String, bool>,
}

/// Constraints on the discovered node capabilities; `None` means "don't care"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPredicates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sriov: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdma: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ib: Option<bool>,
}

fn default_plugin() -> String {
    DEFAULT_PROVIDER.to_string()
}

/// A catalog entry as declared in `profile.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// Owning provider
    #[serde(default = "default_plugin")]
    pub plugin: String,
    #[serde(default)]
    pub profile_requirements: RequirementPredicates,
    #[serde(default)]
    pub node_capabilities: CapabilityPredicates,
    #[serde(default, alias = "deploymentguide")]
    pub deployment_guide: String,
    #[serde(default)]
    pub templates: Vec<String>,
}

/// The first declared predicate that did not hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: profile requires {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

fn check<T: PartialEq + fmt::Debug>(
    field: &str,
    expected: Option<&T>,
    actual: &T,
) -> Result<(), Mismatch> {
    match expected {
        Some(expected) if expected != actual => Err(Mismatch {
            field: field.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }),
        _ => Ok(()),
    }
}

impl ProfileDefinition {
    /// Evaluate every declared predicate, stopping at the first that fails
    pub fn first_mismatch(
        &self,
        requirements: &Requirements,
        capabilities: &ClusterCapabilities,
    ) -> Option<Mismatch> {
        let req = &self.profile_requirements;
        let caps = &self.node_capabilities;
        let nodes = &capabilities.nodes;

        let result = check("fabric", req.fabric.map(Some).as_ref(), &requirements.fabric)
            .and_then(|_| {
                check(
                    "deployment",
                    req.deployment.map(Some).as_ref(),
                    &requirements.deployment,
                )
            })
            .and_then(|_| {
                req.features.iter().try_for_each(|(name, expected)| {
                    check(name, Some(expected), &requirements.feature(name))
                })
            })
            .and_then(|_| check("sriov", caps.sriov.as_ref(), &nodes.sriov()))
            .and_then(|_| check("rdma", caps.rdma.as_ref(), &nodes.rdma()))
            .and_then(|_| check("ib", caps.ib.as_ref(), &nodes.ib()));

        result.err()
    }

    pub fn matches(&self, requirements: &Requirements, capabilities: &ClusterCapabilities) -> bool {
        self.first_mismatch(requirements, capabilities).is_none()
    }

    /// Rewrite template and guide references relative to `directory`
    fn anchored(mut self, directory: &Path) -> Self {
        for template in &mut self.templates {
            *template = directory.join(&*template).to_string_lossy().into_owned();
        }
        if !self.deployment_guide.is_empty() {
            self.deployment_guide = directory
                .join(&self.deployment_guide)
                .to_string_lossy()
                .into_owned();
        }
        self
    }
}

/// A profile bound to its provider, with absolute template and guide paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProfile {
    pub definition: ProfileDefinition,
    pub provider: String,
    pub directory: PathBuf,
}

impl ResolvedProfile {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn templates(&self) -> Vec<PathBuf> {
        self.definition.templates.iter().map(PathBuf::from).collect()
    }

    pub fn deployment_guide(&self) -> Option<PathBuf> {
        if self.definition.deployment_guide.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.definition.deployment_guide))
        }
    }
}

/// Select the first catalog entry for `provider` whose predicates all hold
pub fn resolve(
    catalog: &Catalog,
    requirements: &Requirements,
    capabilities: &ClusterCapabilities,
    provider: &str,
) -> Result<ResolvedProfile, LaunchError> {
    info!(provider, ?requirements, "Finding applicable profile");

    let entries = catalog.entries(provider)?;
    debug!(provider, count = entries.len(), "Found catalog entries");

    for entry in entries {
        match entry.definition.first_mismatch(requirements, capabilities) {
            None => {
                info!(provider, profile = %entry.definition.name, "Found applicable profile");
                return Ok(ResolvedProfile {
                    definition: entry.definition.anchored(&entry.directory),
                    provider: provider.to_string(),
                    directory: entry.directory,
                });
            }
            Some(mismatch) => {
                debug!(
                    provider,
                    profile = %entry.definition.name,
                    reason = %mismatch,
                    "Profile does not match"
                );
            }
        }
    }

    Err(LaunchError::NoApplicableProfile {
        provider: provider.to_string(),
        requirements: Box::new(requirements.clone()),
        capabilities: Box::new(capabilities.clone()),
    })
}
