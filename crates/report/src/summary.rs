//! The apply report: counts, tallied changes, per-resource details, state and config echo.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use tfbuckets_core::Config;
use tfbuckets_tfcompat::{ApplyOutput, ChangeAction, StateDocument};

use crate::ResourceFilter;

pub struct SummaryInputs<'a> {
    pub apply: &'a ApplyOutput,
    pub state: Option<&'a StateDocument>,
    pub config: Option<&'a Config>,
    pub filter: &'a ResourceFilter,
    pub generated_at: DateTime<Utc>,
}

fn icon(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Create => "✅",
        ChangeAction::Update => "🛠",
        ChangeAction::Delete => "🗑",
    }
}

fn label(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Create => "Created",
        ChangeAction::Update => "Updated",
        ChangeAction::Delete => "Destroyed",
    }
}

/// A missing or unreadable state export drops the state section instead of failing the report.
pub fn load_optional_state(path: &Path) -> Option<StateDocument> {
    match StateDocument::load(path) {
        Ok(s) => Some(s),
        Err(e) if e.is_not_found() => {
            tracing::info!(path = %path.display(), "no state export, skipping state section");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable state export, skipping state section");
            None
        }
    }
}

pub fn load_optional_config(path: &Path) -> Option<Config> {
    match Config::load(path) {
        Ok(c) => Some(c),
        Err(e) if e.is_not_found() => {
            tracing::info!(path = %path.display(), "no config, skipping configuration section");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable config, skipping configuration section");
            None
        }
    }
}

fn apply_section(out: &mut String, apply: &ApplyOutput) {
    match apply.summary {
        Some(s) if s.is_zero() && !apply.has_changes() => {
            let _ = writeln!(out, "✅ Infrastructure is up to date. No changes were applied.");
        }
        None if !apply.has_changes() => {
            let _ = writeln!(out, "ℹ️ No apply summary found in the apply output.");
        }
        _ => {
            let s = apply.counts();
            let _ = writeln!(out, "**Resources:** {} added, {} changed, {} destroyed", s.added, s.changed, s.destroyed);
        }
    }
}

fn changes_section(out: &mut String, apply: &ApplyOutput, filter: &ResourceFilter) {
    let rows: Vec<_> = apply.tally.iter().filter(|(k, _)| filter.allows(&k.resource_type)).collect();
    if rows.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n### Resource Changes");
    for (key, count) in rows {
        let _ = writeln!(out, "- {} {}: {count} {}(s)", icon(key.action), label(key.action), key.resource_type);
    }
}

fn details_section(out: &mut String, apply: &ApplyOutput) {
    if apply.records.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n### Resource Details");
    for rec in &apply.records {
        let _ = writeln!(out, "- {} `{}` {}", icon(rec.action), rec.resource, rec.action.past_tense());
    }
}

fn state_section(out: &mut String, state: &StateDocument, filter: &ResourceFilter) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in state.managed_resources() {
        if filter.allows(&r.type_name) {
            *counts.entry(r.type_name.as_str()).or_insert(0) += 1;
        }
    }
    let _ = writeln!(out, "\n### Current Infrastructure State");
    if counts.is_empty() {
        let _ = writeln!(out, "- No tracked resources in state");
    }
    for (type_name, count) in counts {
        let _ = writeln!(out, "- {type_name}: {count}");
    }
}

fn config_section(out: &mut String, config: &Config) {
    let _ = writeln!(out, "\n### Configuration");
    let _ = writeln!(out, "- Project: {}", config.project);
    let _ = writeln!(out, "- Buckets: {}", config.buckets.len());
    for b in &config.buckets {
        let _ = writeln!(out, "  - {} (prefix: {})", b.name, b.prefix);
    }
}

pub fn render_summary(inputs: &SummaryInputs<'_>) -> String {
    let mut out = String::from("## 📊 Terraform Apply Summary\n\n");
    apply_section(&mut out, inputs.apply);
    changes_section(&mut out, inputs.apply, inputs.filter);
    details_section(&mut out, inputs.apply);
    if let Some(state) = inputs.state {
        state_section(&mut out, state, inputs.filter);
    }
    if let Some(config) = inputs.config {
        config_section(&mut out, config);
    }
    let _ = writeln!(
        out,
        "\n_Summary generated at {}_",
        inputs.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    out
}
