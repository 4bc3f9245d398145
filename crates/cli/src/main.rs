use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::fmt::format::FmtSpan;

use tfbuckets_core::{load_document, Config, Schema, DEFAULT_CONFIG_FILE};
use tfbuckets_policy::{Checker, ResourceNames};
use tfbuckets_report::{self as report, ResourceFilter, SummaryInputs};
use tfbuckets_tfcompat as tfc;

#[derive(Parser, Debug)]
#[command(author, version, about="tfbuckets — CI helpers for the Terraform bucket/IAM workflow")]
struct Cli {
    /// Bucket config file (YAML)
    #[arg(short, long, default_value=DEFAULT_CONFIG_FILE, global = true)]
    file: PathBuf,

    /// Runner used by `show`
    #[arg(long, value_enum, default_value_t=Runner::Auto, global = true)]
    runner: Runner,

    /// Log at debug level
    #[arg(short, long, default_value_t=false, global = true)]
    verbose: bool,

    /// Log line format (logs go to stderr)
    #[arg(long, value_enum, default_value_t=LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Runner { Auto, Terraform, Tofu }

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum LogFormat { Json, Text }

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Validate the config, fill in defaults and rewrite it in place
    Validate {
        /// Report only; leave the file untouched
        #[arg(long)] dry_run: bool,
    },
    /// Write the buckets list as a Terraform variables file
    Tfvars {
        #[arg(short, long, default_value=tfc::DEFAULT_TFVARS_FILE)] output: PathBuf,
    },
    /// Summarize an apply log, state export and config
    Summary {
        #[arg(long, default_value="apply-output.txt")] apply_output: PathBuf,
        #[arg(long, default_value="state.json")] state: PathBuf,
        /// Resource types kept in the changes and state sections (repeatable)
        #[arg(long="resource-type")] resource_types: Vec<String>,
        /// Keep every resource type
        #[arg(long, conflicts_with="resource_types")] all_resource_types: bool,
        /// Markdown file the report is appended to; empty means stdout only
        #[arg(long, env=report::STEP_SUMMARY_ENV)] step_summary: Option<String>,
    },
    /// Summarize resource_changes from an apply result, or the plan when no apply happened
    PlanSummary {
        #[arg(long, default_value="apply-result.json")] apply_result: PathBuf,
        #[arg(long, default_value="plan.json")] plan: PathBuf,
        #[arg(long, env=report::STEP_SUMMARY_ENV)] step_summary: Option<String>,
    },
    /// Check planned IAM policies, roles and attachments against the config
    CheckPolicy {
        #[arg(long, default_value="plan.json")] plan: PathBuf,
        #[arg(long, default_value="bucket_write_policy")] policy_block: String,
        #[arg(long, default_value="bucket_writer")] role_block: String,
        #[arg(long, default_value="attach_policy")] attachment_block: String,
    },
    /// Export a saved plan (or the current state) as JSON
    Show {
        #[arg(long, default_value=".")] dir: PathBuf,
        /// Saved plan file; state is exported when omitted
        #[arg(long)] plan_file: Option<PathBuf>,
        #[arg(short, long)] output: PathBuf,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn validate(file: &Path, dry_run: bool) -> Result<ExitCode> {
    println!("🔍 Validating {} schema...", file.display());
    let doc = match load_document(file) {
        Ok(d) => d,
        Err(e) => {
            println!("❌ {e}");
            if let Some(src) = std::error::Error::source(&e) { println!("  {src}"); }
            println!("\n❌ Validation failed");
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("Loaded config from {}", file.display());

    let validated = match tfbuckets_core::validate(&Schema::standard(), &doc) {
        Ok(v) => v,
        Err(errors) => {
            println!("❌ Config validation failed:");
            for e in errors.iter() { println!("  {e}"); }
            println!("\n❌ Validation failed");
            tracing::warn!(errors = errors.0.len(), "config rejected");
            return Ok(ExitCode::FAILURE);
        }
    };

    if !validated.defaults_applied.is_empty() {
        println!("⚠️  Default values were applied for missing fields: {}", validated.defaults_applied.join(", "));
    }
    if dry_run {
        println!("✅ Config validated successfully (dry run, not saved)");
    } else {
        validated.config.save(file).context("save validated config")?;
        println!("✅ Config validated successfully and saved");
    }

    let cfg = &validated.config;
    println!("\n📋 Validated config:");
    println!("  Project: {}", cfg.project);
    println!("  Buckets: {}", cfg.buckets.len());
    for (i, b) in cfg.buckets.iter().enumerate() {
        println!("    {}. {} (prefix: {})", i + 1, b.name, b.prefix);
    }
    Ok(ExitCode::SUCCESS)
}

// CI runners may export the variable empty.
fn step_summary_path(raw: Option<String>) -> Option<PathBuf> {
    raw.filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}

fn check_policy(file: &Path, plan: &Path, names: ResourceNames) -> Result<ExitCode> {
    let cfg = Config::load(file).context("load config")?;
    let plan = tfc::PlanDocument::load(plan).context("load plan")?;
    let result = Checker::new(names).check(&cfg, &plan);
    print!("{result}");
    if result.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(failures = result.failures(), "policy conformance failed");
        Ok(ExitCode::FAILURE)
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.cmd {
        Cmd::Validate { dry_run } => validate(&cli.file, dry_run),
        Cmd::Tfvars { output } => {
            let doc = load_document(&cli.file).context("load config")?;
            tfc::write_tfvars(&doc, &output)?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Summary { apply_output, state, resource_types, all_resource_types, step_summary } => {
            let apply = tfc::read_apply_log(&apply_output)?;
            let state = report::load_optional_state(&state);
            let config = report::load_optional_config(&cli.file);
            let filter = if all_resource_types {
                ResourceFilter::All
            } else if resource_types.is_empty() {
                ResourceFilter::standard()
            } else {
                ResourceFilter::only(resource_types)
            };
            let text = report::render_summary(&SummaryInputs {
                apply: &apply,
                state: state.as_ref(),
                config: config.as_ref(),
                filter: &filter,
                generated_at: chrono::Utc::now(),
            });
            report::publish(&text, step_summary_path(step_summary).as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::PlanSummary { apply_result, plan, step_summary } => {
            let (source, doc) = report::load_changes(&apply_result, &plan)?;
            let text = report::render_changes(source, &doc.resource_changes);
            report::publish(text.trim_end(), step_summary_path(step_summary).as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::CheckPolicy { plan, policy_block, role_block, attachment_block } => {
            let names = ResourceNames { policy: policy_block, role: role_block, attachment: attachment_block };
            check_policy(&cli.file, &plan, names)
        }
        Cmd::Show { dir, plan_file, output } => {
            let r = match cli.runner {
                Runner::Terraform => Some(tfc::Runner::Terraform),
                Runner::Tofu      => Some(tfc::Runner::Tofu),
                Runner::Auto      => None
            };
            let runner = tfc::pick_runner(r)?;
            let json = tfc::run_show_json(runner, &dir, plan_file.as_deref())?;
            std::fs::write(&output, json).with_context(|| format!("write {}", output.display()))?;
            tracing::info!(path = %output.display(), "show output written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);
    run(cli)
}
