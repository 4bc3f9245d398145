use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod schema;

pub use schema::{validate, FieldError, FieldRule, Schema, SchemaErrors, Validated};

/// Default location of the bucket config, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub project: String,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub prefix: String,
    pub iam_role_name: String,
    pub write_prefix: String,
}

impl Bucket {
    /// `prefix-name`, the bucket name as provisioned in S3.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.prefix, self.name)
    }

    /// Write prefix with a guaranteed trailing `/`.
    pub fn normalized_write_prefix(&self) -> String {
        if self.write_prefix.ends_with('/') {
            self.write_prefix.clone()
        } else {
            format!("{}/", self.write_prefix)
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}", path.display())]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse YAML in {}", path.display())]
    Parse { path: PathBuf, #[source] source: serde_yaml::Error },
    #[error("failed to write {}", path.display())]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to serialize config")]
    Serialize(#[source] serde_yaml::Error),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound(_))
    }
}

/// Reads the config as an untyped YAML document. An empty file yields `Null`.
pub fn load_document(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Read { path: path.to_path_buf(), source }
        }
    })?;
    if raw.trim().is_empty() {
        return Ok(serde_yaml::Value::Null);
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

impl Config {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let doc = load_document(path)?;
        serde_yaml::from_value(doc).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Overwrites `path` with this config. Field order follows the struct definitions.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, body).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
        tracing::debug!(path = %path.display(), "config written");
        Ok(())
    }
}
