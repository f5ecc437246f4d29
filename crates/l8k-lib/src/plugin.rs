//! Capability provider interface and the registry of enabled providers

use crate::cluster::ClusterApi;
use crate::config::{ClusterConfig, LaunchKubernetesConfig, Requirements};
use crate::context::RunContext;
use crate::error::LaunchError;
use crate::llm::LlmFields;
use crate::options::Options;
use crate::profiles::ResolvedProfile;
use crate::providers::NetworkOperatorProvider;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One networking technology: its requirements, discovery, generation and deployment
///
/// Requirement and discovery operations return partial descriptors; the
/// workflow merges them and rejects conflicting values.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable name used for catalog filtering and output namespacing
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Whether the command line alone fully specifies this provider's requirements
    fn has_requirements_from_options(&self, options: &Options) -> bool;

    fn requirements_from_options(&self, options: &Options) -> Result<Requirements>;

    fn requirements_from_llm(&self, fields: &LlmFields) -> Result<Requirements>;

    /// Provider-specific instructions appended to the LLM system prompt
    fn system_prompt_addendum(&self) -> String {
        String::new()
    }

    /// Query the cluster for this provider's slice of the capabilities
    async fn discover(
        &self,
        ctx: &RunContext,
        cluster: &dyn ClusterApi,
        defaults: &LaunchKubernetesConfig,
    ) -> Result<ClusterConfig>;

    /// Render deployment files; no disk I/O
    fn generate_files(
        &self,
        profile: &ResolvedProfile,
        config: &LaunchKubernetesConfig,
    ) -> Result<BTreeMap<String, String>>;

    /// Apply files previously written to `manifests_dir`
    async fn deploy(
        &self,
        ctx: &RunContext,
        profile: &ResolvedProfile,
        cluster: &dyn ClusterApi,
        manifests_dir: &Path,
    ) -> Result<()>;
}

/// Provider implementations shipped with the launch kit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    NetworkOperator,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 1] = [ProviderKind::NetworkOperator];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::NetworkOperator => crate::providers::network_operator::NAME,
        }
    }

    pub fn from_name(name: &str) -> Result<Self, LaunchError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| LaunchError::UnknownProvider(name.to_string()))
    }

    pub fn instantiate(&self) -> Arc<dyn Provider> {
        match self {
            ProviderKind::NetworkOperator => Arc::new(NetworkOperatorProvider::new()),
        }
    }
}

/// Active providers keyed by name, iterated in name order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Instantiate every enabled provider; an unknown name fails the whole set
    pub fn from_enabled<S: AsRef<str>>(names: &[S]) -> Result<Self, LaunchError> {
        let providers = names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                ProviderKind::from_name(name).map(|kind| kind.instantiate())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_providers(providers))
    }

    /// Registry over caller-supplied implementations
    pub fn with_providers(providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Provider>, LaunchError> {
        self.providers
            .get(name)
            .ok_or_else(|| LaunchError::UnknownProvider(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
