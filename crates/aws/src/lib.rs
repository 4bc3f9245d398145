use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tfbuckets_core::Bucket;

pub const S3_BUCKET: &str = "aws_s3_bucket";
pub const IAM_POLICY: &str = "aws_iam_policy";
pub const IAM_ROLE: &str = "aws_iam_role";
pub const IAM_ROLE_POLICY_ATTACHMENT: &str = "aws_iam_role_policy_attachment";

pub const POLICY_VERSION: &str = "2012-10-17";
pub const PUT_OBJECT: &str = "s3:PutObject";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect { Allow }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

/// `arn:aws:s3:::<prefix>-<name>/<write_prefix>/*`
pub fn write_prefix_arn(bucket: &Bucket) -> String {
    format!("arn:aws:s3:::{}/{}*", bucket.full_name(), bucket.normalized_write_prefix())
}

/// The single-statement policy granting `s3:PutObject` below the bucket's write prefix.
pub fn expected_write_policy(bucket: &Bucket) -> PolicyDocument {
    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement: vec![Statement {
            effect: Effect::Allow,
            action: vec![PUT_OBJECT.to_string()],
            resource: write_prefix_arn(bucket),
        }],
    }
}
