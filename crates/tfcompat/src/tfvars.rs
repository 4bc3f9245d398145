//! `terraform.tfvars.json` emission.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_TFVARS_FILE: &str = "terraform.tfvars.json";

#[derive(Serialize)]
struct Tfvars<'a> {
    buckets: &'a serde_yaml::Value,
}

/// Copies the config's `buckets` sequence verbatim into `{"buckets": [...]}`.
pub fn render_tfvars(config: &serde_yaml::Value) -> Result<String> {
    let buckets = config.get("buckets").context("config has no 'buckets' key")?;
    serde_json::to_string_pretty(&Tfvars { buckets }).context("serialize tfvars")
}

pub fn write_tfvars(config: &serde_yaml::Value, out: &Path) -> Result<()> {
    let body = render_tfvars(config)?;
    if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    std::fs::write(out, body).with_context(|| format!("write {}", out.display()))?;
    tracing::info!(path = %out.display(), "tfvars written");
    Ok(())
}
