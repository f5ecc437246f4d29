//! On-disk profile catalog: one directory per entry holding `profile.yaml`

use super::ProfileDefinition;
use crate::error::LaunchError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Manifest file name inside each catalog entry directory
pub const PROFILE_MANIFEST: &str = "profile.yaml";

/// A parsed catalog entry and the directory it was read from
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub directory: PathBuf,
    pub definition: ProfileDefinition,
}

/// Read-only view of a catalog root directory
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    /// Open a catalog; relative roots are anchored at the working directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| {
                    LaunchError::configuration(format!(
                        "failed to determine working directory: {}",
                        e
                    ))
                })?
                .join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries owned by `provider`, ordered by directory name
    pub fn entries(&self, provider: &str) -> Result<Vec<CatalogEntry>, LaunchError> {
        let read_dir = std::fs::read_dir(&self.root).map_err(|e| {
            LaunchError::configuration(format!(
                "failed to read profiles directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut directories = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                LaunchError::configuration(format!(
                    "failed to read profiles directory {}: {}",
                    self.root.display(),
                    e
                ))
            })?;
            if entry.path().is_dir() {
                directories.push(entry.path());
            }
        }
        directories.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut entries = Vec::new();
        for directory in directories {
            let definition = load_definition(&directory.join(PROFILE_MANIFEST))?;
            if definition.plugin != provider {
                debug!(
                    profile = %definition.name,
                    plugin = %definition.plugin,
                    provider,
                    "Skipping profile owned by another provider"
                );
                continue;
            }
            entries.push(CatalogEntry {
                directory,
                definition,
            });
        }

        Ok(entries)
    }
}

fn load_definition(manifest: &Path) -> Result<ProfileDefinition, LaunchError> {
    let content = std::fs::read_to_string(manifest).map_err(|e| {
        LaunchError::configuration(format!(
            "failed to read profile manifest {}: {}",
            manifest.display(),
            e
        ))
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        LaunchError::configuration(format!(
            "failed to parse profile manifest {}: {}",
            manifest.display(),
            e
        ))
    })
}
