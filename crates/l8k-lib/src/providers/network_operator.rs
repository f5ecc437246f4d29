//! NVIDIA network operator provider
//!
//! Owns the fabric, deployment type and the `multirail`, `spectrumX` and `ai`
//! feature flags. Discovery reads node labels and the operator deployment;
//! generation renders the profile templates against the configuration
//! document.

use crate::cluster::ClusterApi;
use crate::config::{
    features, ClusterConfig, DeploymentType, Fabric, LaunchKubernetesConfig, Requirements,
};
use crate::context::RunContext;
use crate::llm::LlmFields;
use crate::options::Options;
use crate::plugin::Provider;
use crate::profiles::ResolvedProfile;
use crate::render::TemplateRenderer;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub const NAME: &str = "network-operator";
pub const VERSION: &str = "0.1.0";

/// Namespace searched when the defaults document does not name one
pub const DEFAULT_NAMESPACE: &str = "nvidia-network-operator";

/// Extra template variable carrying the resolved profile name
pub const PROFILE_NAME_KEY: &str = "profileName";

const FABRIC_KEY: &str = "fabric";
const DEPLOYMENT_TYPE_KEY: &str = "deploymentType";

const PROMPT_ADDENDUM: &str = r#"The network-operator provider selects a deployment profile from these fields:
- "fabric": "ethernet" or "infiniband"
- "deploymentType": "sriov", "hostdev" or "rdma-shared"
- "multirail": true when workloads use several NICs per node
- "spectrumX": true for NVIDIA Spectrum-X Ethernet fabrics
- "ai": true for AI training or inference workloads
Use "infiniband" only when the cluster reports InfiniBand capable nodes. Prefer "sriov" when SR-IOV is available and workloads need dedicated virtual functions."#;

/// Provider for the NVIDIA network operator stack
#[derive(Debug, Clone, Default)]
pub struct NetworkOperatorProvider {
    renderer: TemplateRenderer,
}

impl NetworkOperatorProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_flag(fields: &LlmFields, key: &str) -> Result<bool> {
    match fields.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => bail!("invalid value for {}: {} (expected true or false)", key, v),
    }
}

fn required_field<'a>(fields: &'a LlmFields, key: &str) -> Result<&'a str> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("LLM response does not specify {}", key))
}

/// Deployment type the files are rendered for: the profile's own constraint, else the run's requirements
fn deployment_type(
    profile: &ResolvedProfile,
    config: &LaunchKubernetesConfig,
) -> Result<DeploymentType> {
    profile
        .definition
        .profile_requirements
        .deployment
        .or_else(|| config.profile.as_ref().and_then(|p| p.deployment))
        .with_context(|| format!("profile {} has no deployment type", profile.name()))
}

#[async_trait]
impl Provider for NetworkOperatorProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn has_requirements_from_options(&self, options: &Options) -> bool {
        options.fabric.is_some() && options.deployment_type.is_some()
    }

    fn requirements_from_options(&self, options: &Options) -> Result<Requirements> {
        let fabric = options
            .fabric
            .as_deref()
            .map(str::parse::<Fabric>)
            .transpose()?;
        let deployment = options
            .deployment_type
            .as_deref()
            .map(str::parse::<DeploymentType>)
            .transpose()?;

        Ok(Requirements {
            fabric,
            deployment,
            features: BTreeMap::new(),
        }
        .with_feature(features::MULTIRAIL, options.multirail)
        .with_feature(features::SPECTRUM_X, options.spectrum_x)
        .with_feature(features::AI, options.ai))
    }

    fn requirements_from_llm(&self, fields: &LlmFields) -> Result<Requirements> {
        let fabric: Fabric = required_field(fields, FABRIC_KEY)?.parse()?;
        let deployment: DeploymentType = required_field(fields, DEPLOYMENT_TYPE_KEY)?.parse()?;

        let requirements = Requirements {
            fabric: Some(fabric),
            deployment: Some(deployment),
            features: BTreeMap::new(),
        }
        .with_feature(features::MULTIRAIL, parse_flag(fields, features::MULTIRAIL)?)
        .with_feature(features::SPECTRUM_X, parse_flag(fields, features::SPECTRUM_X)?)
        .with_feature(features::AI, parse_flag(fields, features::AI)?);

        debug!(?requirements, "Requirements from LLM response");
        Ok(requirements)
    }

    fn system_prompt_addendum(&self) -> String {
        PROMPT_ADDENDUM.to_string()
    }

    async fn discover(
        &self,
        ctx: &RunContext,
        cluster: &dyn ClusterApi,
        defaults: &LaunchKubernetesConfig,
    ) -> Result<ClusterConfig> {
        let namespace = defaults
            .network_operator
            .as_ref()
            .map(|op| op.namespace.trim())
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);

        info!(namespace, "Discovering network operator cluster configuration");
        let discovered = ctx
            .run(async {
                cluster
                    .discover(namespace)
                    .await
                    .context("Failed to discover cluster capabilities")
            })
            .await?;

        debug!(
            workers = discovered.worker_nodes.len(),
            pfs = discovered.pfs.len(),
            "Discovery complete"
        );
        Ok(discovered)
    }

    fn generate_files(
        &self,
        profile: &ResolvedProfile,
        config: &LaunchKubernetesConfig,
    ) -> Result<BTreeMap<String, String>> {
        let deployment = deployment_type(profile, config)?;
        config.validate_for(deployment)?;

        let mut context =
            serde_json::to_value(config).context("Failed to serialize cluster config")?;
        if let Some(map) = context.as_object_mut() {
            map.insert(
                PROFILE_NAME_KEY.to_string(),
                serde_json::Value::String(profile.name().to_string()),
            );
        }

        let files = self.renderer.render(&profile.templates(), &context)?;
        info!(profile = %profile.name(), files = files.len(), "Generated deployment files");
        Ok(files)
    }

    async fn deploy(
        &self,
        ctx: &RunContext,
        profile: &ResolvedProfile,
        cluster: &dyn ClusterApi,
        manifests_dir: &Path,
    ) -> Result<()> {
        info!(profile = %profile.name(), dir = %manifests_dir.display(), "Deploying profile");
        let applied = ctx
            .run(async {
                cluster.apply(manifests_dir).await.with_context(|| {
                    format!("Failed to apply manifests from {}", manifests_dir.display())
                })
            })
            .await?;
        info!(profile = %profile.name(), objects = applied, "Profile deployed");
        Ok(())
    }
}
