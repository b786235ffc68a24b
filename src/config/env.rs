//! Environment variable layer.
//!
//! `TERMCONF_LOG_LEVEL` maps to `logLevel`, `TERMCONF_UI_ACCENT_COLOR` to
//! `ui.accentColor`. Matching is case-insensitive on the variable side.
//! Values stay raw strings; coercion happens in the validator.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::fields::{FIELDS, set_path};

/// Infix of the key-material fallback variables, which are never settings.
pub const ENCRYPTION_KEY_INFIX: &str = "ENCRYPTION_KEY_";

/// Snapshot of the process environment.
///
/// Variables whose name or value is not valid Unicode are skipped.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Build the environment layer for `prefix` (given without the trailing `_`).
///
/// An exactly-uppercase variable wins over a differently-cased duplicate.
/// Empty values count as unset.
pub fn map_env(prefix: &str, env: &HashMap<String, String>) -> Map<String, Value> {
    let prefix = format!("{}_", prefix.trim_end_matches('_').to_ascii_uppercase());
    let suffixes: HashMap<String, &'static str> = FIELDS
        .iter()
        .map(|f| (f.env_suffix(), f.path))
        .collect();

    let mut names: Vec<&String> = env.keys().collect();
    names.sort();

    let mut layer = Map::new();
    let mut exact: HashSet<&'static str> = HashSet::new();
    let mut unknown = Vec::new();

    for name in names {
        let upper = name.to_ascii_uppercase();
        let Some(suffix) = upper.strip_prefix(&prefix) else {
            continue;
        };
        if suffix.starts_with(ENCRYPTION_KEY_INFIX) {
            continue;
        }
        let Some(&path) = suffixes.get(suffix) else {
            unknown.push(name.as_str());
            continue;
        };

        let value = &env[name];
        if value.is_empty() || exact.contains(path) {
            continue;
        }
        if *name == upper {
            exact.insert(path);
        }
        set_path(&mut layer, path, Value::String(value.clone()));
    }

    if !unknown.is_empty() {
        debug!(variables = ?unknown, "Ignoring unrecognized prefixed environment variables");
    }

    layer
}
