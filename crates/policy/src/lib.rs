use serde_json::Value as Json;
use std::fmt;

use tfbuckets_aws::{expected_write_policy, IAM_POLICY, IAM_ROLE, IAM_ROLE_POLICY_ATTACHMENT};
use tfbuckets_core::{Bucket, Config};
use tfbuckets_tfcompat::{PlanDocument, Resource};

/// Terraform block names of the per-bucket IAM resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub policy: String,
    pub role: String,
    pub attachment: String,
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            policy: "bucket_write_policy".to_string(),
            role: "bucket_writer".to_string(),
            attachment: "attach_policy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind { Policy, RoleName, RolePolicyArn, Attachment }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub passed: bool,
    pub message: String,
    /// Expected/actual lines printed under a failure.
    pub details: Vec<String>,
}

impl CheckResult {
    fn pass(kind: CheckKind, message: String) -> Self {
        Self { kind, passed: true, message, details: Vec::new() }
    }

    fn fail(kind: CheckKind, message: String) -> Self {
        Self { kind, passed: false, message, details: Vec::new() }
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", if self.passed { "PASS" } else { "FAIL" }, self.message)?;
        for line in &self.details {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub bucket: String,
    pub checks: Vec<CheckResult>,
}

impl BucketReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConformanceReport {
    pub buckets: Vec<BucketReport>,
}

impl ConformanceReport {
    pub fn passed(&self) -> bool {
        self.buckets.iter().all(BucketReport::passed)
    }

    pub fn failures(&self) -> usize {
        self.buckets.iter().flat_map(|b| &b.checks).filter(|c| !c.passed).count()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in self.buckets.iter().flat_map(|b| &b.checks) {
            writeln!(f, "{check}")?;
        }
        Ok(())
    }
}

fn pretty(v: &Json) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}

/// Compares planned IAM resources against what the config says each bucket should get.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    names: ResourceNames,
}

impl Checker {
    pub fn new(names: ResourceNames) -> Self { Self { names } }

    pub fn check(&self, config: &Config, plan: &PlanDocument) -> ConformanceReport {
        let policies = plan.indexed(IAM_POLICY, &self.names.policy);
        let roles = plan.indexed(IAM_ROLE, &self.names.role);
        let attachments = plan.indexed(IAM_ROLE_POLICY_ATTACHMENT, &self.names.attachment);

        let buckets = config
            .buckets
            .iter()
            .map(|b| {
                let report = check_bucket(
                    b,
                    policies.get(&b.name).copied(),
                    roles.get(&b.name).copied(),
                    attachments.get(&b.name).copied(),
                );
                tracing::debug!(bucket = %b.name, passed = report.passed(), "bucket checked");
                report
            })
            .collect();
        ConformanceReport { buckets }
    }
}

fn check_policy_document(bucket: &Bucket, policy: &Resource) -> CheckResult {
    let name = &bucket.name;
    let Some(raw) = policy.value_str("policy") else {
        return CheckResult::fail(CheckKind::Policy, format!("Policy for bucket '{name}' has no policy document in the plan"));
    };
    let actual: Json = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return CheckResult::fail(CheckKind::Policy, format!("Could not parse policy JSON for bucket '{name}': {e}"))
        }
    };
    let expected = expected_write_policy(bucket).to_json();
    if actual == expected {
        CheckResult::pass(CheckKind::Policy, format!("Policy for bucket '{name}' matches expected policy."))
    } else {
        CheckResult::fail(CheckKind::Policy, format!("Policy for bucket '{name}' does not match expected policy."))
            .with_details(vec![format!("Expected: {}", pretty(&expected)), format!("Actual: {}", pretty(&actual))])
    }
}

fn check_role(bucket: &Bucket, role: &Resource, policy_arn: Option<&str>) -> Vec<CheckResult> {
    let name = &bucket.name;
    let expected_role = bucket.iam_role_name.as_str();
    let mut out = Vec::new();

    match role.value_str("name") {
        Some(actual) if actual == expected_role => {
            out.push(CheckResult::pass(CheckKind::RoleName, format!("Role name for bucket '{name}' matches expected.")))
        }
        actual => out.push(CheckResult::fail(
            CheckKind::RoleName,
            format!("Role name for bucket '{name}' is '{}', expected '{expected_role}'", actual.unwrap_or("<missing>")),
        )),
    }

    let attached: Vec<&str> = role
        .values
        .get("managed_policy_arns")
        .and_then(Json::as_array)
        .map(|arns| arns.iter().filter_map(Json::as_str).collect())
        .unwrap_or_default();
    out.push(match policy_arn {
        None => CheckResult::fail(
            CheckKind::RolePolicyArn,
            format!("Policy ARN for bucket '{name}' is not known; cannot verify role '{expected_role}'"),
        ),
        Some(arn) if attached.contains(&arn) => {
            CheckResult::pass(CheckKind::RolePolicyArn, format!("Role '{expected_role}' has correct policy attached."))
        }
        Some(arn) => CheckResult::fail(
            CheckKind::RolePolicyArn,
            format!("Role '{expected_role}' does not have correct policy attached."),
        )
        .with_details(vec![format!("Expected policy ARN: {arn}"), format!("Actual managed_policy_arns: {attached:?}")]),
    });
    out
}

fn check_attachment(bucket: &Bucket, attachment: &Resource, policy_arn: Option<&str>) -> CheckResult {
    let name = &bucket.name;
    let expected_role = bucket.iam_role_name.as_str();
    let actual_role = attachment.value_str("role");
    let actual_arn = attachment.value_str("policy_arn");

    if actual_role == Some(expected_role) && policy_arn.is_some() && actual_arn == policy_arn {
        return CheckResult::pass(CheckKind::Attachment, format!("Attachment for bucket '{name}' links correct role and policy."));
    }
    CheckResult::fail(CheckKind::Attachment, format!("Attachment for bucket '{name}' does not link correct role and policy."))
        .with_details(vec![
            format!("Expected role: {expected_role}, actual: {}", actual_role.unwrap_or("<missing>")),
            format!(
                "Expected policy ARN: {}, actual: {}",
                policy_arn.unwrap_or("<unknown>"),
                actual_arn.unwrap_or("<missing>")
            ),
        ])
}

/// Runs every check for one bucket. A missing resource fails its own checks only.
pub fn check_bucket(
    bucket: &Bucket,
    policy: Option<&Resource>,
    role: Option<&Resource>,
    attachment: Option<&Resource>,
) -> BucketReport {
    let name = &bucket.name;
    let mut checks = Vec::new();

    match policy {
        Some(p) => checks.push(check_policy_document(bucket, p)),
        None => checks.push(CheckResult::fail(CheckKind::Policy, format!("No policy found for bucket '{name}'"))),
    }
    // ARNs are assigned by the provider; only the plan's own value can be compared.
    let policy_arn = policy.and_then(|p| p.value_str("arn"));

    match role {
        Some(r) => checks.extend(check_role(bucket, r, policy_arn)),
        None => checks.push(CheckResult::fail(CheckKind::RoleName, format!("No role found for bucket '{name}'"))),
    }

    match attachment {
        Some(a) => checks.push(check_attachment(bucket, a, policy_arn)),
        None => checks.push(CheckResult::fail(
            CheckKind::Attachment,
            format!("No role-policy attachment found for bucket '{name}'"),
        )),
    }

    BucketReport { bucket: name.clone(), checks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARN: &str = "arn:aws:iam::123456789012:policy/acme-logs-write";

    fn bucket(name: &str) -> Bucket {
        Bucket {
            name: name.into(),
            prefix: "acme".into(),
            iam_role_name: format!("{name}-writer"),
            write_prefix: "incoming".into(),
        }
    }

    fn policy_json(bucket: &str) -> String {
        json!({
            "Version": "2012-10-17",
            "Statement": [{"Effect": "Allow", "Action": ["s3:PutObject"], "Resource": format!("arn:aws:s3:::acme-{bucket}/incoming/*")}]
        })
        .to_string()
    }

    fn resources_for(name: &str) -> Vec<Json> {
        vec![
            json!({"type": "aws_iam_policy", "name": "bucket_write_policy", "index": name,
                   "values": {"policy": policy_json(name), "arn": ARN}}),
            json!({"type": "aws_iam_role", "name": "bucket_writer", "index": name,
                   "values": {"name": format!("{name}-writer"), "managed_policy_arns": [ARN]}}),
            json!({"type": "aws_iam_role_policy_attachment", "name": "attach_policy", "index": name,
                   "values": {"role": format!("{name}-writer"), "policy_arn": ARN}}),
        ]
    }

    fn plan(resources: Vec<Json>) -> PlanDocument {
        serde_json::from_value(json!({"planned_values": {"root_module": {"resources": resources}}})).unwrap()
    }

    fn config(names: &[&str]) -> Config {
        Config { project: "acme".into(), buckets: names.iter().map(|n| bucket(n)).collect() }
    }

    #[test]
    fn conforming_plan_passes_every_check() {
        let report = Checker::default().check(&config(&["logs"]), &plan(resources_for("logs")));
        assert!(report.passed());
        let kinds: Vec<_> = report.buckets[0].checks.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CheckKind::Policy, CheckKind::RoleName, CheckKind::RolePolicyArn, CheckKind::Attachment]);
        assert!(report.to_string().starts_with("[PASS] Policy for bucket 'logs' matches expected policy.\n"));
    }

    #[test]
    fn missing_role_fails_without_skipping_other_buckets() {
        let mut resources: Vec<Json> = resources_for("logs").into_iter().filter(|r| r["type"] != "aws_iam_role").collect();
        resources.extend(resources_for("raw"));
        let report = Checker::default().check(&config(&["logs", "raw"]), &plan(resources));

        assert!(!report.passed());
        assert!(!report.buckets[0].passed());
        assert!(report.buckets[0].checks.iter().any(|c| c.message == "No role found for bucket 'logs'"));
        assert!(report.buckets[0].checks.iter().any(|c| c.kind == CheckKind::Attachment && c.passed));
        assert!(report.buckets[1].passed());
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn policy_mismatch_prints_expected_and_actual() {
        let mut resources = resources_for("logs");
        resources[0]["values"]["policy"] = json!(policy_json("other"));
        let report = Checker::default().check(&config(&["logs"]), &plan(resources));
        let check = &report.buckets[0].checks[0];
        assert!(!check.passed);
        assert!(check.details[0].contains("arn:aws:s3:::acme-logs/incoming/*"));
        assert!(check.details[1].contains("arn:aws:s3:::acme-other/incoming/*"));
    }

    #[test]
    fn unparsable_policy_still_checks_role_and_attachment() {
        let mut resources = resources_for("logs");
        resources[0]["values"]["policy"] = json!("{broken");
        let report = Checker::default().check(&config(&["logs"]), &plan(resources));
        let checks = &report.buckets[0].checks;
        assert!(checks[0].message.starts_with("Could not parse policy JSON for bucket 'logs'"));
        assert!(checks[1..].iter().all(|c| c.passed));
    }

    #[test]
    fn wrong_arn_and_role_are_reported() {
        let mut resources = resources_for("logs");
        resources[1]["values"]["name"] = json!("someone-else");
        resources[1]["values"]["managed_policy_arns"] = json!(["arn:aws:iam::123456789012:policy/other"]);
        resources[2]["values"]["policy_arn"] = json!("arn:aws:iam::123456789012:policy/other");
        let report = Checker::default().check(&config(&["logs"]), &plan(resources));
        let failed: Vec<_> = report.buckets[0].checks.iter().filter(|c| !c.passed).map(|c| c.kind).collect();
        assert_eq!(failed, vec![CheckKind::RoleName, CheckKind::RolePolicyArn, CheckKind::Attachment]);
        assert_eq!(
            report.buckets[0].checks[1].message,
            "Role name for bucket 'logs' is 'someone-else', expected 'logs-writer'"
        );
    }

    #[test]
    fn missing_policy_marks_arn_checks_failed() {
        let resources: Vec<Json> = resources_for("logs").into_iter().filter(|r| r["type"] != "aws_iam_policy").collect();
        let report = Checker::default().check(&config(&["logs"]), &plan(resources));
        let checks = &report.buckets[0].checks;
        assert_eq!(checks[0].message, "No policy found for bucket 'logs'");
        assert!(checks[1].passed);
        assert!(!checks[2].passed);
        assert!(!checks[3].passed);
    }

    #[test]
    fn custom_block_names_are_honoured() {
        let names = ResourceNames { policy: "write".into(), ..ResourceNames::default() };
        let report = Checker::new(names).check(&config(&["logs"]), &plan(resources_for("logs")));
        assert_eq!(report.buckets[0].checks[0].message, "No policy found for bucket 'logs'");
    }
}
