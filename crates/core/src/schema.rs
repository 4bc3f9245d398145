//! Table-driven validation of the raw config document.
//!
//! The validator never touches the filesystem: it takes a parsed YAML document and
//! either returns a normalized [`Config`] or every field-level violation it found.

use serde_yaml::{Mapping, Value};
use std::fmt;
use thiserror::Error;

use crate::Config;

/// Constraints for one string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    pub allow_empty: bool,
    /// Substituted when the field is absent or null.
    pub default: Option<&'static str>,
}

impl FieldRule {
    pub const fn required_string(name: &'static str, default: &'static str) -> Self {
        Self { name, required: true, allow_empty: false, default: Some(default) }
    }
}

/// Shape of the config: string fields at the top level plus one list of mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub top_level: Vec<FieldRule>,
    pub list_field: &'static str,
    pub item_fields: Vec<FieldRule>,
}

impl Schema {
    /// The bucket config schema with its default table.
    pub fn standard() -> Self {
        Self {
            top_level: vec![FieldRule::required_string("project", "default-project")],
            list_field: "buckets",
            item_fields: vec![
                FieldRule::required_string("name", "default-bucket"),
                FieldRule::required_string("prefix", "default-prefix"),
                FieldRule::required_string("iam_role_name", "default-role"),
                FieldRule::required_string("write_prefix", "default/write/"),
            ],
        }
    }

    fn is_known_top_level(&self, key: &str) -> bool {
        key == self.list_field || self.top_level.iter().any(|r| r.name == key)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config validation failed with {} error(s)", .0.len())]
pub struct SchemaErrors(pub Vec<FieldError>);

impl SchemaErrors {
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub config: Config,
    /// Paths of fields that were filled from the default table, e.g. `buckets[0].prefix`.
    pub defaults_applied: Vec<String>,
}

struct Walk {
    errors: Vec<FieldError>,
    defaults_applied: Vec<String>,
}

impl Walk {
    fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError { path: path.into(), message: message.into() });
    }

    /// Checks the mapping against `rules`, returning a normalized copy holding only known fields.
    fn mapping(&mut self, prefix: &str, map: &Mapping, rules: &[FieldRule], extra: &dyn Fn(&str) -> bool) -> Mapping {
        let mut out = Mapping::new();
        for (key, _) in map {
            match key.as_str() {
                Some(k) if rules.iter().any(|r| r.name == k) || extra(k) => {}
                Some(k) => self.fail(join(prefix, k), "unknown field"),
                None => self.fail(join(prefix, &format!("{key:?}")), "unknown field"),
            }
        }
        for rule in rules {
            let path = join(prefix, rule.name);
            match map.get(rule.name) {
                None | Some(Value::Null) => match rule.default {
                    Some(d) => {
                        out.insert(Value::from(rule.name), Value::from(d));
                        self.defaults_applied.push(path);
                    }
                    None if rule.required => self.fail(path, "required field"),
                    None => {}
                },
                Some(Value::String(s)) if s.is_empty() && !rule.allow_empty => {
                    self.fail(path, "empty values not allowed")
                }
                Some(v @ Value::String(_)) => {
                    out.insert(Value::from(rule.name), v.clone());
                }
                Some(_) => self.fail(path, "must be of string type"),
            }
        }
        out
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") }
}

/// Validates `doc` against `schema`. All violations are collected before returning.
pub fn validate(schema: &Schema, doc: &Value) -> Result<Validated, SchemaErrors> {
    let mut walk = Walk { errors: Vec::new(), defaults_applied: Vec::new() };
    let empty = Mapping::new();
    let root = match doc {
        Value::Null => &empty,
        Value::Mapping(m) => m,
        _ => return Err(SchemaErrors(vec![FieldError { path: "<root>".into(), message: "must be of dict type".into() }])),
    };

    let mut normalized = walk.mapping("", root, &schema.top_level, &|k: &str| schema.is_known_top_level(k));

    let mut items = Vec::new();
    match root.get(schema.list_field) {
        None | Some(Value::Null) => walk.fail(schema.list_field, "required field"),
        Some(Value::Sequence(seq)) => {
            for (i, item) in seq.iter().enumerate() {
                let prefix = format!("{}[{i}]", schema.list_field);
                match item {
                    Value::Mapping(m) => {
                        let entry = walk.mapping(&prefix, m, &schema.item_fields, &|_: &str| false);
                        items.push(Value::Mapping(entry));
                    }
                    _ => walk.fail(prefix, "must be of dict type"),
                }
            }
        }
        Some(_) => walk.fail(schema.list_field, "must be of list type"),
    }

    if !walk.errors.is_empty() {
        return Err(SchemaErrors(walk.errors));
    }
    normalized.insert(Value::from(schema.list_field), Value::Sequence(items));

    let config: Config = serde_yaml::from_value(Value::Mapping(normalized)).map_err(|e| {
        SchemaErrors(vec![FieldError { path: "<root>".into(), message: e.to_string() }])
    })?;
    tracing::debug!(buckets = config.buckets.len(), defaults = walk.defaults_applied.len(), "config validated");
    Ok(Validated { config, defaults_applied: walk.defaults_applied })
}
