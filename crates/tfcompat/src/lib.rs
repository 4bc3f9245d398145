use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

pub mod apply_log;
pub mod plan;
pub mod tfvars;

pub use apply_log::{
    classify_line, parse_apply_log, parse_summary, read_apply_log, ApplyLogError, ApplyOutput, ApplyRecord,
    ApplySummary, ChangeAction, LineClass, ProgressPhase, ResourceRef, TallyKey,
};
pub use plan::{PlanDocument, PlanError, Resource, ResourceChange, StateDocument};
pub use tfvars::{render_tfvars, write_tfvars, DEFAULT_TFVARS_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner { Terraform, Tofu }

pub fn pick_runner(prefer: Option<Runner>) -> Result<Runner> {
    if let Some(p) = prefer { return Ok(p); }
    if which::which("tofu").is_ok() { Ok(Runner::Tofu) }
    else if which::which("terraform").is_ok() { Ok(Runner::Terraform) }
    else { anyhow::bail!("Neither 'tofu' nor 'terraform' found in PATH") }
}

fn bin(r: Runner) -> &'static str { match r { Runner::Terraform => "terraform", Runner::Tofu => "tofu" } }

fn show_args(dir: &Path, plan_file: Option<&Path>) -> Vec<String> {
    let mut args = vec![format!("-chdir={}", dir.display()), "show".to_string(), "-json".to_string()];
    if let Some(p) = plan_file { args.push(p.display().to_string()); }
    args
}

/// `show -json` for a saved plan file, or for the current state when `plan_file` is `None`.
#[tracing::instrument(level = "info", skip(dir, plan_file))]
pub fn run_show_json(r: Runner, dir: &Path, plan_file: Option<&Path>) -> Result<Vec<u8>> {
    let out = Command::new(bin(r)).args(show_args(dir, plan_file)).output()
        .with_context(|| format!("spawn {} show", bin(r)))?;
    if !out.status.success() {
        anyhow::bail!("{} show failed: {}", bin(r), String::from_utf8_lossy(&out.stderr).trim())
    }
    Ok(out.stdout)
}
