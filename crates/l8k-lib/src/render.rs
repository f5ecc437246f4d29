//! Template rendering collaborator
//!
//! Each template file renders independently against the serialized context.
//! The output file name is the template name with a trailing `.tmpl` or `.j2`
//! removed.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const TEMPLATE_SUFFIXES: &[&str] = &[".tmpl", ".j2"];

/// Renders profile templates with `tera`
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render every template; returns output file name to content
    pub fn render(
        &self,
        templates: &[PathBuf],
        context: &impl Serialize,
    ) -> Result<BTreeMap<String, String>> {
        let context =
            tera::Context::from_serialize(context).context("Failed to build template context")?;

        let mut rendered = BTreeMap::new();
        for template in templates {
            let name = output_name(template)?;
            let source = std::fs::read_to_string(template)
                .with_context(|| format!("Failed to read template {}", template.display()))?;

            let content = tera::Tera::one_off(&source, &context, false)
                .with_context(|| format!("Failed to render template {}", template.display()))?;

            if rendered.insert(name.clone(), content).is_some() {
                bail!("Templates produce duplicate output file {}", name);
            }
            debug!(template = %template.display(), output = %name, "Rendered template");
        }

        Ok(rendered)
    }
}

/// Output file name for a template path
pub fn output_name(template: &Path) -> Result<String> {
    let file_name = template
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid template path {}", template.display()))?;

    let name = TEMPLATE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .unwrap_or(file_name);

    if name.is_empty() {
        bail!("Template {} has an empty output name", template.display());
    }
    Ok(name.to_string())
}
