//! Kubernetes networking launch kit CLI
//!
//! Discovers the cluster's networking capabilities, selects a deployment
//! profile from flags or with LLM assistance, renders the deployment files
//! and optionally applies them.

mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use l8k_lib::cluster::KubeCluster;
use l8k_lib::llm::{create_client, LlmSettings, Vendor};
use l8k_lib::logging::{init_logging, LogOptions};
use l8k_lib::ui::{Output, SilentOutput, TerminalOutput};
use l8k_lib::{LauncherBuilder, Options, ProviderRegistry};
use output::{print_error, print_info, print_outcome, print_success, print_warning, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Kubernetes networking launch kit
#[derive(Parser)]
#[command(name = "l8k")]
#[command(author, version, about = "NVIDIA Kubernetes Launch Kit: network profile selection and deployment", long_about = None)]
pub struct Cli {
    /// Discover the cluster's networking capabilities
    #[arg(long)]
    pub discover_cluster_config: bool,

    /// Where to write the discovered cluster configuration
    #[arg(long, value_name = "PATH")]
    pub save_cluster_config: Option<PathBuf>,

    /// Use an existing cluster configuration instead of discovering one
    #[arg(long, value_name = "PATH")]
    pub user_config: Option<PathBuf>,

    /// Static defaults document read before discovery
    #[arg(long, value_name = "PATH", default_value = "l8k-config.yaml")]
    pub defaults_config: PathBuf,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Network fabric (ethernet, infiniband)
    #[arg(long)]
    pub fabric: Option<String>,

    /// Deployment type (sriov, hostdev, rdma-shared)
    #[arg(long)]
    pub deployment_type: Option<String>,

    /// Use several NICs per node
    #[arg(long)]
    pub multirail: bool,

    /// Target a Spectrum-X Ethernet fabric
    #[arg(long)]
    pub spectrum_x: bool,

    /// Tune for AI workloads
    #[arg(long)]
    pub ai: bool,

    /// File describing the desired setup in natural language
    #[arg(long, value_name = "PATH")]
    pub prompt: Option<PathBuf>,

    /// Select the profile in an interactive chat
    #[arg(long)]
    pub llm_interactive: bool,

    /// API key for the LLM vendor
    #[arg(long, env = "L8K_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Base URL of the LLM API
    #[arg(long)]
    pub llm_api_url: Option<String>,

    /// LLM vendor (openai, openai-azure, anthropic, gemini)
    #[arg(long)]
    pub llm_vendor: Option<String>,

    /// Model name, or the deployment name for openai-azure
    #[arg(long)]
    pub llm_model: Option<String>,

    /// Instructions sent to the LLM as the system prompt
    #[arg(long, value_name = "PATH", default_value = "system-prompt")]
    pub system_prompt: PathBuf,

    /// Profile catalog directory
    #[arg(long, value_name = "PATH", default_value = "profiles")]
    pub profiles_dir: PathBuf,

    /// Directory for the generated deployment files
    #[arg(long, value_name = "PATH")]
    pub save_deployment_files: Option<PathBuf>,

    /// Apply the generated files to the cluster
    #[arg(long)]
    pub deploy: bool,

    /// Comma-separated list of enabled plugins
    #[arg(long, value_delimiter = ',', default_value = "network-operator")]
    pub enabled_plugins: Vec<String>,

    /// Log filter, e.g. debug or l8k_lib=trace (defaults to RUST_LOG, then info)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Disable logging
    #[arg(long, short)]
    pub quiet: bool,

    /// Output format for the run summary
    #[arg(long, short, value_enum)]
    pub format: Option<OutputFormat>,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            discover_cluster_config: self.discover_cluster_config,
            save_cluster_config: self.save_cluster_config.clone(),
            user_config: self.user_config.clone(),
            defaults_config: self.defaults_config.clone(),
            fabric: self.fabric.clone(),
            deployment_type: self.deployment_type.clone(),
            multirail: self.multirail,
            spectrum_x: self.spectrum_x,
            ai: self.ai,
            prompt: self.prompt.clone(),
            llm_interactive: self.llm_interactive,
            system_prompt: self.system_prompt.clone(),
            profiles_dir: self.profiles_dir.clone(),
            save_deployment_files: self.save_deployment_files.clone(),
            deploy: self.deploy,
            enabled_plugins: self
                .enabled_plugins
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The interactive chat prints to the terminal, which would corrupt a JSON summary
    fn check_format(&self, format: OutputFormat) -> Result<()> {
        if self.llm_interactive && matches!(format, OutputFormat::Json) {
            bail!("--llm-interactive cannot be combined with --format json; use --prompt instead");
        }
        Ok(())
    }

    fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.log_level.clone(),
            file: self.log_file.clone(),
            json: self.log_json,
            enabled: !self.quiet,
        }
    }

    fn llm_settings(&self, config: &config::Config) -> LlmSettings {
        LlmSettings {
            api_key: self.llm_api_key.clone().unwrap_or_default(),
            api_url: self.llm_api_url.clone().or_else(|| config.llm_api_url.clone()),
            vendor: self
                .llm_vendor
                .clone()
                .or_else(|| config.llm_vendor.clone())
                .unwrap_or_else(|| Vendor::OpenAi.to_string()),
            model: self.llm_model.clone().or_else(|| config.llm_model.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_options())?;

    let config = config::Config::load()?;
    let format = cli.format.or(config.default_format).unwrap_or_default();
    let options = cli.options();
    options.validate()?;
    cli.check_format(format)?;
    let registry = ProviderRegistry::from_enabled(&options.enabled_plugins)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    let ui: Arc<dyn Output> = match format {
        OutputFormat::Table => Arc::new(TerminalOutput::new()),
        OutputFormat::Json => Arc::new(SilentOutput),
    };

    let mut builder = LauncherBuilder::new(options.clone())
        .registry(registry)
        .ui(ui)
        .cancellation(cancel);

    let needs_cluster =
        (options.discover_cluster_config && options.user_config.is_none()) || options.deploy;
    if needs_cluster {
        let kubeconfig = config::kubeconfig_path(cli.kubeconfig.as_deref())?;
        let cluster = if kubeconfig.exists() {
            KubeCluster::from_kubeconfig(Some(kubeconfig.as_path())).await
        } else {
            info!(path = %kubeconfig.display(), "Kubeconfig not found, inferring cluster configuration");
            KubeCluster::from_kubeconfig(None).await
        }
        .context("Failed to create Kubernetes client")?;
        if matches!(format, OutputFormat::Table) {
            print_success("Connected to Kubernetes cluster");
        }
        builder = builder.cluster(Arc::new(cluster));
    }

    if options.prompt.is_some() || options.llm_interactive {
        match create_client(&cli.llm_settings(&config)) {
            Ok(client) => builder = builder.llm(client),
            Err(e) => {
                warn!(error = %e, "LLM client unavailable");
                print_warning(&format!("LLM assistance unavailable: {:#}", e));
            }
        }
    }

    let outcome = builder.build()?.run().await?;
    print_outcome(&outcome, format)?;

    if let (OutputFormat::Table, Some(dir)) = (format, &options.save_deployment_files) {
        if !options.deploy && matches!(outcome, l8k_lib::Outcome::Completed(_)) {
            print_info(&format!(
                "Deployment files are in {}; rerun with --deploy to apply them",
                dir.display()
            ));
        }
    }

    Ok(())
}
