//! Structured logging setup
//!
//! Logs go to stderr (stdout belongs to the terminal UI) or to an appended
//! log file, as text or JSON, filtered by an explicit level or `RUST_LOG`.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Logging configuration assembled from CLI flags
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive such as `debug` or `l8k_lib=trace`; falls back to `RUST_LOG`, then `info`
    pub level: Option<String>,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
    pub json: bool,
    pub enabled: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: None,
            file: None,
            json: false,
            enabled: true,
        }
    }
}

impl LogOptions {
    fn filter(&self) -> Result<EnvFilter> {
        match &self.level {
            Some(level) => EnvFilter::try_new(level)
                .with_context(|| format!("Invalid log level: {}", level)),
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
        }
    }

    fn layer(&self) -> Result<Box<dyn Layer<Registry> + Send + Sync>> {
        let layer = match (&self.file, self.json) {
            (Some(path), json) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
                if json {
                    layer.json().boxed()
                } else {
                    layer.boxed()
                }
            }
            (None, true) => fmt::layer().json().with_writer(std::io::stderr).boxed(),
            (None, false) => fmt::layer().with_writer(std::io::stderr).boxed(),
        };
        Ok(layer)
    }
}

/// Install the global tracing subscriber
pub fn init_logging(options: &LogOptions) -> Result<()> {
    if !options.enabled {
        return Ok(());
    }

    let filter = options.filter()?;
    let layer = options.layer()?;

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let options = LogOptions {
            level: Some("l8k=verbose".to_string()),
            ..Default::default()
        };
        assert!(options.filter().is_err());
    }

    #[test]
    fn test_file_layer_creates_log_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("l8k.log");
        let options = LogOptions {
            file: Some(path.clone()),
            json: true,
            ..Default::default()
        };
        assert!(options.layer().is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let options = LogOptions {
            enabled: false,
            level: Some("l8k=verbose".to_string()),
            ..Default::default()
        };
        assert!(init_logging(&options).is_ok());
    }
}
