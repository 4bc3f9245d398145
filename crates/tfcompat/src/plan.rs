//! Models for `terraform show -json` output (plans and state snapshots).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}", path.display())]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse JSON in {}", path.display())]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
}

impl PlanError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlanError::NotFound(_))
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PlanError> {
    let raw = std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PlanError::NotFound(path.to_path_buf())
        } else {
            PlanError::Read { path: path.to_path_buf(), source }
        }
    })?;
    serde_json::from_slice(&raw).map_err(|source| PlanError::Parse { path: path.to_path_buf(), source })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    /// The `for_each` key or `count` index.
    #[serde(default)]
    pub index: Option<Json>,
    #[serde(default)]
    pub values: Json,
}

impl Resource {
    pub fn index_str(&self) -> Option<&str> {
        self.index.as_ref().and_then(Json::as_str)
    }

    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Json::as_str)
    }

    pub fn is_data_source(&self) -> bool {
        self.mode.as_deref() == Some("data")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub child_modules: Vec<Module>,
}

impl Module {
    /// Resources of this module followed by those of its children, depth first.
    pub fn all_resources(&self) -> Vec<&Resource> {
        let mut out: Vec<&Resource> = self.resources.iter().collect();
        for child in &self.child_modules {
            out.extend(child.all_resources());
        }
        out
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Values {
    #[serde(default)]
    pub root_module: Module,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceChange {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub change: Change,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub planned_values: Values,
    #[serde(default)]
    pub resource_changes: Vec<ResourceChange>,
}

impl PlanDocument {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        load_json(path)
    }

    pub fn planned_resources(&self) -> Vec<&Resource> {
        self.planned_values.root_module.all_resources()
    }

    /// Planned resources of one type and block name, keyed by their string index.
    pub fn indexed(&self, type_name: &str, name: &str) -> std::collections::BTreeMap<String, &Resource> {
        self.planned_resources()
            .into_iter()
            .filter(|r| r.type_name == type_name && r.name == name)
            .filter_map(|r| r.index_str().map(|i| (i.to_string(), r)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub values: Values,
}

impl StateDocument {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        load_json(path)
    }

    /// Managed resources only; data sources are reads and not part of the infrastructure.
    pub fn managed_resources(&self) -> Vec<&Resource> {
        self.values.root_module.all_resources().into_iter().filter(|r| !r.is_data_source()).collect()
    }
}
