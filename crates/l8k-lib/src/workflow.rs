//! Launch workflow orchestrator
//!
//! Phases run strictly in order:
//! - Init: option validation and provider registration
//! - Discovery (optional): provider partials merged into the configuration document
//! - RequirementsAcquisition: command line flags, interactive chat or a prompt file
//! - Resolution: one catalog profile per provider
//! - Generation: rendered files written under `<output>/<provider>/`
//! - Deployment (optional): generated files applied per provider
//!
//! The first error ends the run; files already written stay on disk.

use crate::cluster::ClusterApi;
use crate::config::{ClusterConfig, LaunchKubernetesConfig, Requirements};
use crate::context::RunContext;
use crate::error::LaunchError;
use crate::llm::{
    build_system_prompt, run_interactive, select_profile, ChatSession, CompletionClient,
    LineSource, LlmFields, StdinLines,
};
use crate::options::Options;
use crate::plugin::ProviderRegistry;
use crate::profiles::{self, Catalog, ResolvedProfile};
use crate::ui::{Output, TerminalOutput};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Workflow phase, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    Discovery,
    RequirementsAcquisition,
    Resolution,
    Generation,
    Deployment,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "initialization",
            Phase::Discovery => "cluster discovery",
            Phase::RequirementsAcquisition => "requirements acquisition",
            Phase::Resolution => "profile resolution",
            Phase::Generation => "deployment files generation",
            Phase::Deployment => "deployment",
        };
        f.write_str(name)
    }
}

/// A run failure tagged with the phase it happened in
#[derive(Debug, Error)]
#[error("{phase} failed: {error}")]
pub struct WorkflowError {
    pub phase: Phase,
    #[source]
    error: LaunchError,
}

impl WorkflowError {
    pub fn new(phase: Phase, error: LaunchError) -> Self {
        Self { phase, error }
    }

    /// The underlying error, for matching on its kind
    pub fn error(&self) -> &LaunchError {
        &self.error
    }

    pub fn into_error(self) -> LaunchError {
        self.error
    }
}

fn at(phase: Phase) -> impl FnOnce(LaunchError) -> WorkflowError {
    move |error| WorkflowError::new(phase, error)
}

/// Files rendered for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFiles {
    pub provider: String,
    pub profile: String,
    pub files: Vec<String>,
    /// Where the files were written; `None` when no output directory was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub cluster_config: Option<PathBuf>,
    pub requirements: Requirements,
    /// Provider name to resolved profile name
    pub profiles: BTreeMap<String, String>,
    pub generated: Vec<GeneratedFiles>,
    /// Providers whose profile was applied to the cluster
    pub deployed: Vec<String>,
}

/// How a run ended successfully
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    /// No requirement source was given; the run stopped after discovery
    Skipped { cluster_config: Option<PathBuf> },
    Completed(Report),
}

/// Builder for a [`Launcher`]
pub struct LauncherBuilder {
    options: Options,
    registry: Option<ProviderRegistry>,
    cluster: Option<Arc<dyn ClusterApi>>,
    llm: Option<Arc<dyn CompletionClient>>,
    input: Option<Box<dyn LineSource>>,
    ui: Option<Arc<dyn Output>>,
    cancel: Option<CancellationToken>,
}

impl LauncherBuilder {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            registry: None,
            cluster: None,
            llm: None,
            input: None,
            ui: None,
            cancel: None,
        }
    }

    /// Use these providers instead of instantiating the enabled names
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cluster access for discovery and deployment
    pub fn cluster(mut self, cluster: Arc<dyn ClusterApi>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Completion client for the prompt and interactive paths
    pub fn llm(mut self, llm: Arc<dyn CompletionClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Line source for the interactive session; stdin by default
    pub fn input(mut self, input: Box<dyn LineSource>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn ui(mut self, ui: Arc<dyn Output>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the Init phase: validate options and register providers
    ///
    /// Nothing is invoked on any provider before this succeeds.
    pub fn build(self) -> Result<Launcher, WorkflowError> {
        let options = self.options;
        options.validate().map_err(at(Phase::Init))?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => ProviderRegistry::from_enabled(&options.enabled_plugins)
                .map_err(at(Phase::Init))?,
        };
        if registry.is_empty() {
            return Err(WorkflowError::new(
                Phase::Init,
                LaunchError::configuration("no plugins enabled"),
            ));
        }
        info!(providers = ?registry.names(), "Registered providers");

        let needs_cluster =
            (options.discover_cluster_config && options.user_config.is_none()) || options.deploy;
        if needs_cluster && self.cluster.is_none() {
            return Err(WorkflowError::new(
                Phase::Init,
                LaunchError::configuration(
                    "cluster discovery and deployment require access to a cluster (--kubeconfig)",
                ),
            ));
        }

        let ui = self
            .ui
            .unwrap_or_else(|| Arc::new(TerminalOutput::new()) as Arc<dyn Output>);
        let ctx = RunContext::new(self.cancel.unwrap_or_default(), ui);

        Ok(Launcher {
            options,
            registry,
            cluster: self.cluster,
            llm: self.llm,
            input: self.input,
            ctx,
        })
    }
}

/// Drives one launch run
pub struct Launcher {
    options: Options,
    registry: ProviderRegistry,
    cluster: Option<Arc<dyn ClusterApi>>,
    llm: Option<Arc<dyn CompletionClient>>,
    input: Option<Box<dyn LineSource>>,
    ctx: RunContext,
}

impl Launcher {
    pub fn builder(options: Options) -> LauncherBuilder {
        LauncherBuilder::new(options)
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Execute the remaining phases
    pub async fn run(mut self) -> Result<Outcome, WorkflowError> {
        let result = self.execute().await;
        if let Err(e) = &result {
            error!(phase = ?e.phase, error = %e.error(), "Workflow failed");
        }
        result
    }

    async fn execute(&mut self) -> Result<Outcome, WorkflowError> {
        let ctx = self.ctx.clone();
        let ui = ctx.ui();
        ui.header("NVIDIA Kubernetes Launch Kit");
        info!("Starting l8k workflow");

        let config_path = if self.options.discover_cluster_config {
            ui.section("Phase 1: Cluster Discovery");
            Some(self.discover().await.map_err(at(Phase::Discovery))?)
        } else {
            self.options.user_config.clone()
        };

        if !self.options.requests_requirements() {
            ui.info("Profiles not configured, skipping deployment file generation");
            info!("No requirement source given, skipping deployment files generation");
            return Ok(Outcome::Skipped {
                cluster_config: config_path,
            });
        }

        let (mut document, requirements) = self
            .acquire_requirements(config_path.as_deref())
            .await
            .map_err(at(Phase::RequirementsAcquisition))?;

        let capabilities = document
            .cluster_config
            .as_ref()
            .map(|c| c.capabilities.clone())
            .unwrap_or_default();
        let resolved = self
            .resolve(&requirements, &capabilities)
            .map_err(at(Phase::Resolution))?;

        document.profile = Some(requirements.clone());

        ui.section("Deployment File Generation");
        let mut generated = Vec::with_capacity(resolved.len());
        for profile in &resolved {
            let files = self
                .generate(profile, &document)
                .map_err(at(Phase::Generation))?;
            generated.push(files);
        }

        let mut deployed = Vec::new();
        if self.options.deploy {
            ui.section("Cluster Deployment");
            for profile in &resolved {
                self.deploy(profile).await.map_err(at(Phase::Deployment))?;
                deployed.push(profile.provider.clone());
            }
        }

        ui.success("Workflow completed successfully");
        info!("l8k workflow completed successfully");

        Ok(Outcome::Completed(Report {
            cluster_config: config_path,
            requirements,
            profiles: resolved
                .iter()
                .map(|p| (p.provider.clone(), p.name().to_string()))
                .collect(),
            generated,
            deployed,
        }))
    }

    fn cluster(&self) -> Result<&dyn ClusterApi, LaunchError> {
        self.cluster
            .as_deref()
            .ok_or_else(|| LaunchError::configuration("no cluster client configured"))
    }

    /// Merge every provider's discovery into the defaults and persist the result
    async fn discover(&self) -> Result<PathBuf, LaunchError> {
        let ui = self.ctx.ui();

        if let Some(user_config) = &self.options.user_config {
            ui.info(&format!("Using provided configuration: {}", user_config.display()));
            info!(path = %user_config.display(), "Using provided user config");
            return Ok(user_config.clone());
        }

        let output = self.options.save_cluster_config.clone().ok_or_else(|| {
            LaunchError::configuration(
                "no output path provided for discovered cluster config (use --save-cluster-config)",
            )
        })?;
        let cluster = self.cluster()?;

        ui.info("Discovering cluster capabilities");
        info!(defaults = %self.options.defaults_config.display(), "Discovering cluster configuration");

        let mut document = LaunchKubernetesConfig::load(&self.options.defaults_config)?;
        document.profile = None;
        document.cluster_config = None;

        let mut merged = ClusterConfig::with_default_selector();
        for provider in self.registry.iter() {
            self.ctx.check()?;
            let progress = ui.start_progress(&format!("Discovering {} configuration", provider.name()));
            let partial = match provider.discover(&self.ctx, cluster, &document).await {
                Ok(partial) => partial,
                Err(e) => {
                    progress.fail("Discovery failed");
                    return Err(LaunchError::provider(provider.name(), e));
                }
            };
            if let Err(conflict) = merged.merge(partial) {
                progress.fail("Discovery conflict");
                return Err(conflict.into());
            }
            progress.success(&format!("Discovered {} configuration", provider.name()));
        }

        let nodes = &merged.capabilities.nodes;
        ui.info(&format!(
            "  Worker nodes: {}  SR-IOV: {}  RDMA: {}  InfiniBand: {}",
            merged.worker_nodes.len(),
            nodes.sriov(),
            nodes.rdma(),
            nodes.ib()
        ));

        document.cluster_config = Some(merged);
        document.save(&output)?;
        ui.success(&format!("Configuration saved: {}", output.display()));
        Ok(output)
    }

    /// Build the requirements from exactly one source and return them with the loaded document
    async fn acquire_requirements(
        &mut self,
        config_path: Option<&Path>,
    ) -> Result<(LaunchKubernetesConfig, Requirements), LaunchError> {
        let path = config_path.ok_or_else(|| {
            LaunchError::configuration(
                "no cluster configuration path provided (use --user-config or --discover-cluster-config)",
            )
        })?;
        let document = LaunchKubernetesConfig::load(path)?;
        if document.profile.is_some() {
            warn!(path = %path.display(), "Replacing the profile stored in the cluster configuration");
        }

        let satisfied_by_flags = self
            .registry
            .iter()
            .all(|p| p.has_requirements_from_options(&self.options));

        let requirements = if satisfied_by_flags {
            info!("Building requirements from command line options");
            let mut requirements = Requirements::default();
            for provider in self.registry.iter() {
                let partial = provider
                    .requirements_from_options(&self.options)
                    .map_err(|e| LaunchError::provider(provider.name(), e))?;
                requirements.merge(partial)?;
            }
            requirements
        } else if self.options.llm_interactive || self.options.prompt.is_some() {
            let cluster = document.cluster_config.clone().unwrap_or_default();
            let fields = self.ask_llm(&cluster).await?;
            let requirements = self.requirements_from_llm(&fields)?;
            self.ctx.ui().success("Profile selected");
            info!(
                ?requirements,
                reasoning = %crate::llm::reasoning(&fields),
                "Selected requirements"
            );
            requirements
        } else {
            return Err(LaunchError::configuration(
                "no profile configured in the command line and no prompt provided",
            ));
        };

        let ui = self.ctx.ui();
        ui.info(&format!("  Fabric: {}", display_or_unset(requirements.fabric)));
        ui.info(&format!("  Deployment: {}", display_or_unset(requirements.deployment)));
        ui.info(&format!(
            "  Multirail: {}",
            requirements.feature(crate::config::features::MULTIRAIL)
        ));

        Ok((document, requirements))
    }

    /// Interactive session when requested, else the single-shot prompt
    async fn ask_llm(&mut self, cluster: &ClusterConfig) -> Result<LlmFields, LaunchError> {
        let client = self.llm.clone().ok_or_else(|| {
            LaunchError::configuration("LLM-assisted selection requires an LLM client (--llm-api-key)")
        })?;

        let instructions =
            std::fs::read_to_string(&self.options.system_prompt).map_err(|e| {
                LaunchError::configuration(format!(
                    "failed to read system prompt {}: {}",
                    self.options.system_prompt.display(),
                    e
                ))
            })?;
        let addenda: Vec<String> = self
            .registry
            .iter()
            .map(|p| p.system_prompt_addendum())
            .collect();
        let system_prompt = build_system_prompt(&instructions, &addenda, cluster)?;

        let ui = self.ctx.ui();
        ui.section("Profile Selection (AI-Assisted)");

        if self.options.llm_interactive {
            info!("Starting interactive LLM session");
            let mut input = self
                .input
                .take()
                .unwrap_or_else(|| Box::new(StdinLines::new()) as Box<dyn LineSource>);
            let mut session = ChatSession::new(client, system_prompt);
            return run_interactive(&self.ctx, &mut session, input.as_mut()).await;
        }

        let prompt_path = self
            .options
            .prompt
            .as_ref()
            .ok_or_else(|| LaunchError::configuration("no prompt file provided (--prompt)"))?;
        let prompt_text = std::fs::read_to_string(prompt_path).map_err(|e| {
            LaunchError::configuration(format!(
                "failed to read prompt file {}: {}",
                prompt_path.display(),
                e
            ))
        })?;

        ui.info("Analyzing requirements with AI");
        info!("Selecting a profile using LLM-assisted prompt");
        let progress = ui.start_progress("Waiting for AI recommendation");
        match select_profile(&self.ctx, client.as_ref(), &system_prompt, &prompt_text).await {
            Ok(fields) => {
                progress.success("Recommendation received");
                Ok(fields)
            }
            Err(e) => {
                if let LaunchError::LowConfidence { reasoning } = &e {
                    progress.fail("Low confidence recommendation");
                    ui.warning(&format!("AI has low confidence: {}", reasoning));
                } else {
                    progress.fail("AI selection failed");
                }
                Err(e)
            }
        }
    }

    fn requirements_from_llm(&self, fields: &LlmFields) -> Result<Requirements, LaunchError> {
        let mut requirements = Requirements::default();
        for provider in self.registry.iter() {
            let partial = provider
                .requirements_from_llm(fields)
                .map_err(|e| LaunchError::provider(provider.name(), e))?;
            requirements.merge(partial)?;
        }
        Ok(requirements)
    }

    fn resolve(
        &self,
        requirements: &Requirements,
        capabilities: &crate::config::ClusterCapabilities,
    ) -> Result<Vec<ResolvedProfile>, LaunchError> {
        let catalog = Catalog::new(&self.options.profiles_dir)?;
        let mut resolved = Vec::with_capacity(self.registry.len());
        for provider in self.registry.iter() {
            self.ctx.check()?;
            let profile = profiles::resolve(&catalog, requirements, capabilities, provider.name())?;
            self.ctx
                .ui()
                .info(&format!("Selected profile for {}: {}", provider.name(), profile.name()));
            resolved.push(profile);
        }
        Ok(resolved)
    }

    fn generate(
        &self,
        profile: &ResolvedProfile,
        document: &LaunchKubernetesConfig,
    ) -> Result<GeneratedFiles, LaunchError> {
        self.ctx.check()?;
        let ui = self.ctx.ui();
        ui.info(&format!("Generating files for profile: {}", profile.name()));
        info!(profile = %profile.name(), provider = %profile.provider, "Generating deployment files");

        let provider = self.registry.get(&profile.provider)?;
        let files = provider
            .generate_files(profile, document)
            .map_err(|e| LaunchError::provider(&profile.provider, e))?;

        let directory = match &self.options.save_deployment_files {
            Some(root) => {
                let dir = root.join(&profile.provider);
                write_files(&dir, &files)?;
                ui.success(&format!("Saved {} file(s) to: {}", files.len(), dir.display()));
                Some(dir)
            }
            None => None,
        };

        Ok(GeneratedFiles {
            provider: profile.provider.clone(),
            profile: profile.name().to_string(),
            files: files.into_keys().collect(),
            directory,
        })
    }

    async fn deploy(&self, profile: &ResolvedProfile) -> Result<(), LaunchError> {
        self.ctx.check()?;
        let root = self.options.save_deployment_files.as_ref().ok_or_else(|| {
            LaunchError::configuration(
                "--deploy requires generated files directory; provide --save-deployment-files",
            )
        })?;
        let provider = self.registry.get(&profile.provider)?;
        let cluster = self.cluster()?;

        let ui = self.ctx.ui();
        ui.info(&format!("Deploying profile: {}", profile.name()));
        let progress = ui.start_progress(&format!("Applying {} manifests", profile.provider));
        match provider
            .deploy(&self.ctx, profile, cluster, &root.join(&profile.provider))
            .await
        {
            Ok(()) => {
                progress.success(&format!("Profile deployed: {}", profile.name()));
                Ok(())
            }
            Err(e) => {
                progress.fail("Deployment failed");
                Err(LaunchError::provider(&profile.provider, e))
            }
        }
    }
}

fn display_or_unset<T: fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unset".to_string())
}

/// Replace `dir` with exactly the given files
fn write_files(dir: &Path, files: &BTreeMap<String, String>) -> Result<(), LaunchError> {
    let io_error = |action: &str, path: &Path, e: std::io::Error| {
        LaunchError::configuration(format!("failed to {} {}: {}", action, path.display(), e))
    };

    for name in files.keys() {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(LaunchError::configuration(format!(
                "invalid deployment file name: {:?}",
                name
            )));
        }
    }

    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| io_error("clean output directory", dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| io_error("create output directory", dir, e))?;

    for (name, content) in files {
        let path = dir.join(name);
        std::fs::write(&path, content).map_err(|e| io_error("write file", &path, e))?;
        info!(file = %path.display(), "Saved deployment file");
    }

    info!(directory = %dir.display(), count = files.len(), "All deployment files saved");
    Ok(())
}
