use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

pub mod changes;
pub mod summary;

pub use changes::{action_label, load_changes, render_changes, ChangesSource};
pub use summary::{load_optional_config, load_optional_state, render_summary, SummaryInputs};

/// Environment variable GitHub Actions sets to the job summary file.
pub const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

/// Resource types that make it into the tally and state sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    All,
    Only(BTreeSet<String>),
}

impl ResourceFilter {
    /// Buckets and the roles that write to them.
    pub fn standard() -> Self {
        Self::only([tfbuckets_aws::S3_BUCKET, tfbuckets_aws::IAM_ROLE])
    }

    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(types.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, resource_type: &str) -> bool {
        match self {
            ResourceFilter::All => true,
            ResourceFilter::Only(types) => types.contains(resource_type),
        }
    }
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::standard()
    }
}

/// Appends `report` to the step summary file in a single write, creating it if needed.
pub fn append_step_summary(path: &Path, report: &str) -> Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open step summary {}", path.display()))?;
    let mut body = report.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    f.write_all(body.as_bytes()).with_context(|| format!("append step summary {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = body.len(), "step summary appended");
    Ok(())
}

/// Prints the report and, when a destination is configured, appends it there too.
pub fn publish(report: &str, step_summary: Option<&Path>) -> Result<()> {
    println!("{report}");
    if let Some(path) = step_summary {
        append_step_summary(path, report)?;
    }
    Ok(())
}
