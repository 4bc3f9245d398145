//! Change counts straight from the `resource_changes` of a plan or apply-result export.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use tfbuckets_tfcompat::{PlanDocument, ResourceChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesSource { Applied, Planned }

impl ChangesSource {
    fn header(&self) -> &'static str {
        match self {
            ChangesSource::Applied => "📊 Deployment Summary (Applied Changes):",
            ChangesSource::Planned => "📋 Plan Summary (Planned Changes):",
        }
    }
}

pub fn action_label(actions: &[String]) -> String {
    let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
    match actions.as_slice() {
        ["create"] => "✅ Created".to_string(),
        ["update"] => "🛠 Updated".to_string(),
        ["delete"] => "🗑 Deleted".to_string(),
        ["no-op"] => "⚠️ Unchanged".to_string(),
        ["read"] => "📖 Read".to_string(),
        ["create", "delete"] | ["delete", "create"] => "🔁 Replaced".to_string(),
        other => other.join("/"),
    }
}

/// Prefers the apply result; falls back to the plan when no apply happened.
pub fn load_changes(apply_result: &Path, plan: &Path) -> Result<(ChangesSource, PlanDocument)> {
    match PlanDocument::load(apply_result) {
        Ok(doc) => Ok((ChangesSource::Applied, doc)),
        Err(e) if e.is_not_found() => {
            tracing::info!(path = %apply_result.display(), "no apply result, using plan");
            let doc = PlanDocument::load(plan).context("load plan")?;
            Ok((ChangesSource::Planned, doc))
        }
        Err(e) => Err(e).context("load apply result"),
    }
}

pub fn render_changes(source: ChangesSource, changes: &[ResourceChange]) -> String {
    let mut counts: BTreeMap<(&[String], &str), usize> = BTreeMap::new();
    for c in changes {
        *counts.entry((c.change.actions.as_slice(), c.type_name.as_str())).or_insert(0) += 1;
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", source.header());
    if counts.is_empty() {
        let _ = writeln!(out, "No resource changes.");
    }
    for ((actions, type_name), count) in counts {
        let _ = writeln!(out, "{}: {count} {type_name}(s)", action_label(actions));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfbuckets_tfcompat::plan::Change;

    fn change(actions: &[&str], type_name: &str) -> ResourceChange {
        ResourceChange {
            address: None,
            type_name: type_name.to_string(),
            name: None,
            change: Change { actions: actions.iter().map(|a| a.to_string()).collect() },
        }
    }

    #[test]
    fn labels_cover_replacement_both_ways() {
        let s = |a: &[&str]| a.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        assert_eq!(action_label(&s(&["create", "delete"])), "🔁 Replaced");
        assert_eq!(action_label(&s(&["delete", "create"])), "🔁 Replaced");
        assert_eq!(action_label(&s(&["no-op"])), "⚠️ Unchanged");
        assert_eq!(action_label(&s(&["forget", "create"])), "forget/create");
    }

    #[test]
    fn counts_are_grouped_and_sorted() {
        let changes = vec![
            change(&["update"], "aws_iam_role"),
            change(&["create"], "aws_s3_bucket"),
            change(&["create"], "aws_iam_policy"),
            change(&["create"], "aws_s3_bucket"),
        ];
        assert_eq!(
            render_changes(ChangesSource::Planned, &changes),
            "📋 Plan Summary (Planned Changes):\n✅ Created: 1 aws_iam_policy(s)\n✅ Created: 2 aws_s3_bucket(s)\n🛠 Updated: 1 aws_iam_role(s)\n"
        );
    }

    #[test]
    fn apply_result_wins_over_plan() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.json");
        let applied = dir.path().join("apply-result.json");
        std::fs::write(&plan, r#"{"resource_changes": [{"type": "aws_s3_bucket", "change": {"actions": ["create"]}}]}"#).unwrap();

        let (source, doc) = load_changes(&applied, &plan).unwrap();
        assert_eq!(source, ChangesSource::Planned);
        assert_eq!(doc.resource_changes.len(), 1);

        std::fs::write(&applied, r#"{"resource_changes": []}"#).unwrap();
        let (source, doc) = load_changes(&applied, &plan).unwrap();
        assert_eq!(source, ChangesSource::Applied);
        assert!(render_changes(source, &doc.resource_changes).ends_with("No resource changes.\n"));
    }

    #[test]
    fn neither_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_changes(&dir.path().join("a.json"), &dir.path().join("b.json")).is_err());
    }
}
