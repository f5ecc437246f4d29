//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use l8k_lib::{Outcome, Report};
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for the final run summary
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One provider's line in the summary table
#[derive(Debug, Tabled, Serialize)]
pub struct ProviderRow {
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "Profile")]
    pub profile: String,
    #[tabled(rename = "Files")]
    pub files: usize,
    #[tabled(rename = "Output")]
    pub output: String,
    #[tabled(rename = "Deployed")]
    pub deployed: String,
}

/// Summary rows, one per resolved provider profile
pub fn provider_rows(report: &Report) -> Vec<ProviderRow> {
    report
        .generated
        .iter()
        .map(|generated| ProviderRow {
            provider: generated.provider.clone(),
            profile: generated.profile.clone(),
            files: generated.files.len(),
            output: generated
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            deployed: if report.deployed.contains(&generated.provider) {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        })
        .collect()
}

/// Print the outcome of a run
pub fn print_outcome(outcome: &Outcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Table => match outcome {
            Outcome::Skipped { cluster_config } => {
                if let Some(path) = cluster_config {
                    print_info(&format!("Cluster configuration: {}", path.display()));
                }
                print_warning("No requirements given; deployment files were not generated");
            }
            Outcome::Completed(report) => {
                let rows = provider_rows(report);
                if rows.is_empty() {
                    println!("{}", "No profiles resolved".yellow());
                    return Ok(());
                }
                println!();
                println!("{}", Table::new(&rows).with(Style::rounded()));
            }
        },
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use l8k_lib::config::Requirements;
    use l8k_lib::GeneratedFiles;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn report() -> Report {
        Report {
            cluster_config: Some(PathBuf::from("cluster-config.yaml")),
            requirements: Requirements::default(),
            profiles: BTreeMap::from([(
                "network-operator".to_string(),
                "sriov-ethernet".to_string(),
            )]),
            generated: vec![GeneratedFiles {
                provider: "network-operator".to_string(),
                profile: "sriov-ethernet".to_string(),
                files: vec!["a.yaml".to_string(), "b.yaml".to_string()],
                directory: Some(PathBuf::from("out/network-operator")),
            }],
            deployed: vec!["network-operator".to_string()],
        }
    }

    #[test]
    fn test_provider_rows() {
        let rows = provider_rows(&report());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].profile, "sriov-ethernet");
        assert_eq!(rows[0].files, 2);
        assert_eq!(rows[0].output, "out/network-operator");
        assert_eq!(rows[0].deployed, "yes");
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let json = serde_json::to_value(Outcome::Completed(report())).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["profiles"]["network-operator"], "sriov-ethernet");

        let json = serde_json::to_value(Outcome::Skipped {
            cluster_config: None,
        })
        .unwrap();
        assert_eq!(json["status"], "skipped");
    }
}
