//! Best-effort scraping of `terraform apply` console output.
//!
//! The log has no grammar. [`classify_line`] turns one line into a [`LineClass`] and
//! [`parse_apply_log`] folds the completion events into a tally plus an ordered record list.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Variant order matches the lexical order of [`ChangeAction::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeAction { Create, Delete, Update }

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Delete => "delete",
            ChangeAction::Update => "update",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ChangeAction::Create => "created",
            ChangeAction::Delete => "destroyed",
            ChangeAction::Update => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase { Creating, Updating, Destroying, Refreshing, Reading }

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub resource_type: String,
    pub name_block: String,
    pub key: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[\"{}\"]", self.resource_type, self.name_block, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    InProgress { resource: ResourceRef, phase: ProgressPhase },
    Complete { resource: ResourceRef, action: ChangeAction },
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplySummary {
    pub added: u64,
    pub changed: u64,
    pub destroyed: u64,
}

impl ApplySummary {
    pub fn is_zero(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.destroyed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TallyKey {
    pub action: ChangeAction,
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRecord {
    pub resource: ResourceRef,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutput {
    /// `None` when the log carried no summary sentence at all.
    pub summary: Option<ApplySummary>,
    pub tally: BTreeMap<TallyKey, usize>,
    pub records: Vec<ApplyRecord>,
}

impl ApplyOutput {
    /// Counts from the summary sentence, zero when it was missing.
    pub fn counts(&self) -> ApplySummary {
        self.summary.unwrap_or_default()
    }

    pub fn has_changes(&self) -> bool {
        !self.records.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ApplyLogError {
    #[error("failed to read apply output {}", path.display())]
    Read { path: std::path::PathBuf, #[source] source: std::io::Error },
}

enum Phase { Progress(ProgressPhase), Done(ChangeAction) }

const PHASES: &[(&str, Phase)] = &[
    ("Creation complete", Phase::Done(ChangeAction::Create)),
    ("Update complete", Phase::Done(ChangeAction::Update)),
    ("Modifications complete", Phase::Done(ChangeAction::Update)),
    ("Destruction complete", Phase::Done(ChangeAction::Delete)),
    ("Creating", Phase::Progress(ProgressPhase::Creating)),
    ("Still creating", Phase::Progress(ProgressPhase::Creating)),
    ("Updating", Phase::Progress(ProgressPhase::Updating)),
    ("Modifying", Phase::Progress(ProgressPhase::Updating)),
    ("Still modifying", Phase::Progress(ProgressPhase::Updating)),
    ("Destroying", Phase::Progress(ProgressPhase::Destroying)),
    ("Still destroying", Phase::Progress(ProgressPhase::Destroying)),
    ("Refreshing state", Phase::Progress(ProgressPhase::Refreshing)),
    ("Reading", Phase::Progress(ProgressPhase::Reading)),
    ("Still reading", Phase::Progress(ProgressPhase::Reading)),
    ("Read complete", Phase::Progress(ProgressPhase::Reading)),
];

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"));

static RESOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s./])(?P<type>[a-z][a-z0-9_]*)\.(?P<block>[A-Za-z_][A-Za-z0-9_-]*)\["(?P<key>(?:[^"\\]|\\.)*)"\]:\s*(?P<rest>.*)$"#)
        .expect("valid resource regex")
});

// Elapsed-time annotations that may sit between the colon and the phase word.
static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s*(?:\[[^\]]*\]|\(\s*[0-9][0-9hms.]*\s*\)|(?:[0-9]+(?:\.[0-9]+)?(?:ms|h|m|s))+))+\s*")
        .expect("valid noise regex")
});

static APPLY_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Apply complete! Resources: (?:\d+ imported, )?(\d+) added, (\d+) changed, (\d+) destroyed").expect("valid summary regex")
});

static DESTROY_SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Destroy complete! Resources: (\d+) destroyed").expect("valid summary regex"));

fn strip_ansi(text: &str) -> std::borrow::Cow<'_, str> {
    ANSI_RE.replace_all(text, "")
}

pub fn classify_line(line: &str) -> LineClass {
    let line = strip_ansi(line);
    let Some(caps) = RESOURCE_RE.captures(&line) else { return LineClass::Unrecognized };
    let rest = NOISE_RE.replace(&caps["rest"], "");

    let Some((_, phase)) = PHASES.iter().find(|(word, _)| rest.starts_with(word)) else {
        return LineClass::Unrecognized;
    };
    let resource = ResourceRef {
        resource_type: caps["type"].to_string(),
        name_block: caps["block"].to_string(),
        key: caps["key"].to_string(),
    };
    match phase {
        Phase::Progress(p) => LineClass::InProgress { resource, phase: *p },
        Phase::Done(a) => LineClass::Complete { resource, action: *a },
    }
}

fn count(caps: &regex::Captures<'_>, i: usize) -> u64 {
    caps.get(i).and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

pub fn parse_summary(text: &str) -> Option<ApplySummary> {
    let text = strip_ansi(text);
    if let Some(c) = APPLY_SUMMARY_RE.captures(&text) {
        return Some(ApplySummary { added: count(&c, 1), changed: count(&c, 2), destroyed: count(&c, 3) });
    }
    DESTROY_SUMMARY_RE
        .captures(&text)
        .map(|c| ApplySummary { added: 0, changed: 0, destroyed: count(&c, 1) })
}

pub fn parse_apply_log(text: &str) -> ApplyOutput {
    let mut out = ApplyOutput { summary: parse_summary(text), ..Default::default() };
    for line in text.lines() {
        if let LineClass::Complete { resource, action } = classify_line(line) {
            let key = TallyKey { action, resource_type: resource.resource_type.clone() };
            *out.tally.entry(key).or_insert(0) += 1;
            out.records.push(ApplyRecord { resource, action });
        }
    }
    out
}

/// Reads and parses an apply log. A missing file is an empty result, not an error.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn read_apply_log(path: &Path) -> Result<ApplyOutput, ApplyLogError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let out = parse_apply_log(&String::from_utf8_lossy(&bytes));
            tracing::debug!(records = out.records.len(), summary = out.summary.is_some(), "apply output parsed");
            Ok(out)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no apply output found");
            Ok(ApplyOutput::default())
        }
        Err(source) => Err(ApplyLogError::Read { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(t: &str, b: &str, k: &str) -> ResourceRef {
        ResourceRef { resource_type: t.into(), name_block: b.into(), key: k.into() }
    }

    #[test]
    fn single_creation_line_is_tallied() {
        let out = parse_apply_log("aws_s3_bucket.buckets[\"logs\"]: Creation complete\n");
        let key = TallyKey { action: ChangeAction::Create, resource_type: "aws_s3_bucket".into() };
        assert_eq!(out.tally.get(&key), Some(&1));
        assert_eq!(out.tally.len(), 1);
        assert_eq!(out.records.len(), 1);
        let rec = &out.records[0];
        assert_eq!(rec.resource, res("aws_s3_bucket", "buckets", "logs"));
        assert_eq!(rec.action.past_tense(), "created");
    }

    #[test]
    fn in_progress_lines_never_count() {
        let log = "\
aws_s3_bucket.buckets[\"logs\"]: Refreshing state... [id=acme-logs]
aws_s3_bucket.buckets[\"logs\"]: Creating...
aws_s3_bucket.buckets[\"logs\"]: Still creating... [10s elapsed]
aws_iam_role.bucket_writer[\"logs\"]: Modifying... [id=logs-writer]
";
        let out = parse_apply_log(log);
        assert!(out.tally.is_empty());
        assert!(out.records.is_empty());
        assert_eq!(out.summary, None);
    }

    #[test]
    fn classifier_tags_each_phase() {
        assert_eq!(
            classify_line("aws_s3_bucket.buckets[\"logs\"]: Refreshing state... [id=acme-logs]"),
            LineClass::InProgress { resource: res("aws_s3_bucket", "buckets", "logs"), phase: ProgressPhase::Refreshing }
        );
        assert_eq!(
            classify_line("aws_iam_role.bucket_writer[\"logs\"]: Modifications complete after 1s [id=logs-writer]"),
            LineClass::Complete { resource: res("aws_iam_role", "bucket_writer", "logs"), action: ChangeAction::Update }
        );
        assert_eq!(
            classify_line("aws_iam_policy.bucket_write_policy[\"raw\"]: Destruction complete after 0s"),
            LineClass::Complete { resource: res("aws_iam_policy", "bucket_write_policy", "raw"), action: ChangeAction::Delete }
        );
        assert_eq!(classify_line("Plan: 3 to add, 0 to change, 0 to destroy."), LineClass::Unrecognized);
        assert_eq!(classify_line("aws_s3_bucket.buckets[\"logs\"]: Something new"), LineClass::Unrecognized);
    }

    #[test]
    fn escaped_quotes_stay_inside_the_key() {
        let line = r#"aws_s3_bucket.buckets["a\"b"]: Creation complete after 1s"#;
        let LineClass::Complete { resource, action } = classify_line(line) else { panic!("unrecognized: {line}") };
        assert_eq!(action, ChangeAction::Create);
        assert_eq!(resource.key, r#"a\"b"#);
        assert_eq!(resource.to_string(), r#"aws_s3_bucket.buckets["a\"b"]"#);
    }

    #[test]
    fn elapsed_annotations_and_prefixes_are_tolerated() {
        let expected = LineClass::Complete { resource: res("aws_s3_bucket", "buckets", "logs"), action: ChangeAction::Create };
        assert_eq!(classify_line("aws_s3_bucket.buckets[\"logs\"]: [12s elapsed] Creation complete after 12s"), expected);
        assert_eq!(classify_line("aws_s3_bucket.buckets[\"logs\"]: 1m2s Creation complete"), expected);
        assert_eq!(classify_line("aws_s3_bucket.buckets[\"logs\"]: (3s) Creation complete"), expected);
        assert_eq!(classify_line("2024-05-01T10:00:00.1234567Z aws_s3_bucket.buckets[\"logs\"]: Creation complete"), expected);
        assert_eq!(classify_line("module.storage.aws_s3_bucket.buckets[\"logs\"]: Creation complete"), expected);
        assert_eq!(classify_line("\x1b[0m\x1b[1maws_s3_bucket.buckets[\"logs\"]: Creation complete after 2s\x1b[0m"), expected);
    }

    #[test]
    fn summary_presence_is_distinct_from_zero() {
        assert_eq!(parse_summary("nothing here"), None);
        let zero = parse_summary("Apply complete! Resources: 0 added, 0 changed, 0 destroyed.").unwrap();
        assert!(zero.is_zero());
        assert_eq!(
            parse_summary("\x1b[1mApply complete! Resources: 3 added, 1 changed, 2 destroyed.\x1b[0m"),
            Some(ApplySummary { added: 3, changed: 1, destroyed: 2 })
        );
        assert_eq!(
            parse_summary("Destroy complete! Resources: 4 destroyed."),
            Some(ApplySummary { added: 0, changed: 0, destroyed: 4 })
        );
        assert_eq!(
            parse_summary("Apply complete! Resources: 1 imported, 0 added, 0 changed, 0 destroyed."),
            Some(ApplySummary::default())
        );
        assert_eq!(
            parse_summary("Apply complete! Resources: 2 imported, 1 added, 0 changed, 0 destroyed."),
            Some(ApplySummary { added: 1, changed: 0, destroyed: 0 })
        );
    }

    #[test]
    fn records_keep_log_order_and_tally_sorts() {
        let log = "\
aws_iam_role.bucket_writer[\"b\"]: Creation complete after 1s
aws_s3_bucket.buckets[\"a\"]: Modifications complete after 1s
aws_s3_bucket.buckets[\"b\"]: Creation complete after 2s
aws_iam_role.bucket_writer[\"a\"]: Creation complete after 1s
Apply complete! Resources: 3 added, 1 changed, 0 destroyed.
";
        let out = parse_apply_log(log);
        let keys: Vec<_> = out.records.iter().map(|r| r.resource.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "b", "a"]);
        let tally: Vec<_> = out.tally.iter().map(|(k, v)| (k.action.as_str(), k.resource_type.as_str(), *v)).collect();
        assert_eq!(
            tally,
            vec![("create", "aws_iam_role", 2), ("create", "aws_s3_bucket", 1), ("update", "aws_s3_bucket", 1)]
        );
        assert_eq!(out.counts(), ApplySummary { added: 3, changed: 1, destroyed: 0 });
    }

    #[test]
    fn missing_log_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = read_apply_log(&dir.path().join("apply-output.txt")).unwrap();
        assert_eq!(out, ApplyOutput::default());
        assert!(!out.has_changes());
    }
}
