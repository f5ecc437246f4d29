//! Run options assembled by the CLI and threaded through the workflow

use crate::error::LaunchError;
use std::path::PathBuf;

/// Provider enabled when none is requested explicitly
pub const DEFAULT_PROVIDER: &str = "network-operator";

/// Options for a single launch run
#[derive(Debug, Clone)]
pub struct Options {
    /// Query the cluster and persist its capabilities
    pub discover_cluster_config: bool,
    /// Where the discovered configuration document is written
    pub save_cluster_config: Option<PathBuf>,
    /// Pre-built configuration document; bypasses discovery
    pub user_config: Option<PathBuf>,
    /// Static defaults document read before discovery
    pub defaults_config: PathBuf,

    pub fabric: Option<String>,
    pub deployment_type: Option<String>,
    pub multirail: bool,
    pub spectrum_x: bool,
    pub ai: bool,

    /// File holding a natural-language description of the desired setup
    pub prompt: Option<PathBuf>,
    pub llm_interactive: bool,
    pub system_prompt: PathBuf,

    pub profiles_dir: PathBuf,
    /// Root of the generated files tree (`<root>/<provider>/<file>`)
    pub save_deployment_files: Option<PathBuf>,
    pub deploy: bool,
    pub enabled_plugins: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            discover_cluster_config: false,
            save_cluster_config: None,
            user_config: None,
            defaults_config: PathBuf::from("l8k-config.yaml"),
            fabric: None,
            deployment_type: None,
            multirail: false,
            spectrum_x: false,
            ai: false,
            prompt: None,
            llm_interactive: false,
            system_prompt: PathBuf::from("system-prompt"),
            profiles_dir: PathBuf::from("profiles"),
            save_deployment_files: None,
            deploy: false,
            enabled_plugins: vec![DEFAULT_PROVIDER.to_string()],
        }
    }
}

impl Options {
    /// Whether any requirement source was given; without one the run stops after discovery
    pub fn requests_requirements(&self) -> bool {
        self.fabric.is_some()
            || self.deployment_type.is_some()
            || self.prompt.is_some()
            || self.llm_interactive
    }

    /// Path of the configuration document the rest of the run reads
    pub fn cluster_config_path(&self) -> Option<&PathBuf> {
        self.user_config
            .as_ref()
            .or(self.save_cluster_config.as_ref())
    }

    /// Reject flag combinations that cannot succeed
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.deploy && self.save_deployment_files.is_none() {
            return Err(LaunchError::configuration(
                "deployment requested but no deployment files directory given (--save-deployment-files)",
            ));
        }

        if self.discover_cluster_config
            && self.user_config.is_none()
            && self.save_cluster_config.is_none()
        {
            return Err(LaunchError::configuration(
                "cluster discovery requires a path to save the configuration (--save-cluster-config)",
            ));
        }

        if self.requests_requirements() && self.cluster_config_path().is_none() {
            return Err(LaunchError::configuration(
                "a cluster configuration is required: use --user-config or --discover-cluster-config with --save-cluster-config",
            ));
        }

        if self.enabled_plugins.is_empty() {
            return Err(LaunchError::configuration("no plugins enabled"));
        }

        Ok(())
    }
}
