//! Field validation with per-field fallback.
//!
//! Each merged value is coerced by its field's rule. A value that fails is
//! replaced by the built-in default and reported as a warning; the rest of
//! the fields are unaffected.

use serde_json::Value;
use tracing::debug;

use super::fields::{FIELDS, get_path, set_path};
use super::merge::{ConfigLayer, FieldSources, MergedField};
use super::types::Config;
use crate::error::{ConfigResult, ValidationError};

/// Output of validation: the typed snapshot and everything learned on the way.
#[derive(Debug, Clone)]
pub struct Validated {
    pub config: Config,
    pub findings: Vec<ValidationError>,
    pub sources: FieldSources,
}

/// Coerce every merged field and build the typed `Config`.
///
/// Only a tree that fails to deserialize is an error; individual field
/// failures become warnings.
pub fn validate_merged(merged: &[MergedField]) -> ConfigResult<Validated> {
    let mut tree = match serde_json::to_value(Config::default())? {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let mut findings = Vec::new();
    let mut sources = FieldSources::new();

    for field in merged {
        let path = field.spec.path;
        let Some(raw) = &field.raw else {
            sources.insert(path, ConfigLayer::Defaults);
            continue;
        };

        match field.spec.kind.coerce(raw) {
            Ok(value) => {
                set_path(&mut tree, path, value);
                sources.insert(path, field.source);
            }
            Err(message) => {
                let message = if field.decrypted || field.spec.is_secret() {
                    format!("decrypted value rejected, expected {}", field.spec.kind.describe())
                } else {
                    message
                };
                debug!(field = path, source = %field.source, "Field rejected, using default");
                findings.push(ValidationError::warning(
                    path,
                    format!("{} (from {}); using default", message, field.source),
                ));
                sources.insert(path, ConfigLayer::Defaults);
            }
        }
    }

    let config: Config = serde_json::from_value(Value::Object(tree))?;
    Ok(Validated {
        config,
        findings,
        sources,
    })
}

/// Re-check an already-built `Config` against the field rules.
///
/// The config is not modified; each violation is reported as a warning.
pub fn check_config(config: &Config) -> Vec<ValidationError> {
    let tree = match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Vec::new(),
        Err(e) => return vec![ValidationError::error("config", e.to_string())],
    };

    FIELDS
        .iter()
        .filter_map(|spec| {
            let raw = get_path(&tree, spec.path).cloned().unwrap_or(Value::Null);
            spec.kind
                .coerce(&raw)
                .err()
                .map(|message| ValidationError::warning(spec.path, message))
        })
        .collect()
}

/// Escalate every finding to blocking when `strict` is set.
pub fn apply_strict(findings: Vec<ValidationError>, strict: bool) -> Vec<ValidationError> {
    if strict {
        findings.into_iter().map(ValidationError::escalate).collect()
    } else {
        findings
    }
}
