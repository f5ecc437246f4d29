//! Launch kit library for Kubernetes network deployments
//!
//! This crate provides the core functionality for:
//! - Cluster capability discovery through pluggable providers
//! - Declarative profile resolution against an on-disk catalog
//! - LLM-assisted requirements selection (single-shot and interactive)
//! - Deployment file generation and cluster deployment
//! - Terminal output and structured logging

pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod logging;
pub mod options;
pub mod plugin;
pub mod profiles;
pub mod providers;
pub mod render;
pub mod ui;
pub mod workflow;

pub use context::RunContext;
pub use error::{ExtractionError, LaunchError};
pub use options::Options;
pub use plugin::{Provider, ProviderKind, ProviderRegistry};
pub use workflow::{GeneratedFiles, Launcher, LauncherBuilder, Outcome, Phase, Report, WorkflowError};
