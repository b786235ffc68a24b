//! Field registry: every known setting, its kind, and how raw values coerce.
//!
//! The document parser (unknown-key detection), the environment mapper
//! (variable names), the merger and the validator all walk [`FIELDS`].
//! Adding a setting means one entry here plus the matching struct field.

use heck::ToShoutySnakeCase;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;

use super::duration;
use crate::logging::LogLevel;
use crate::paths;

/// How a raw value is checked and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    /// Inclusive range.
    Integer { min: i64, max: i64 },
    /// One of a fixed set of lowercase names.
    Enum(&'static [&'static str]),
    /// Inclusive range.
    Duration { min: Duration, max: Duration },
    /// `#rgb` or `#rrggbb`.
    HexColor,
    /// `http(s)://` or `socks5://` URL.
    Url { optional: bool },
    /// Filesystem path; `~` is expanded.
    Path { optional: bool },
    /// Any string; the value may be an encrypted tag.
    Secret,
}

/// A known setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted document path in canonical (camelCase) form.
    pub path: &'static str,
    pub kind: FieldKind,
}

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        path: "version",
        kind: FieldKind::Enum(&["1"]),
    },
    FieldSpec {
        path: "logLevel",
        kind: FieldKind::Enum(LogLevel::NAMES),
    },
    FieldSpec {
        path: "logFormat",
        kind: FieldKind::Enum(&["text", "json"]),
    },
    FieldSpec {
        path: "maxConcurrentOps",
        kind: FieldKind::Integer { min: 1, max: 16 },
    },
    FieldSpec {
        path: "nonInteractive",
        kind: FieldKind::Bool,
    },
    FieldSpec {
        path: "hotReload",
        kind: FieldKind::Bool,
    },
    FieldSpec {
        path: "ui.theme",
        kind: FieldKind::Enum(&["auto", "dark", "light"]),
    },
    FieldSpec {
        path: "ui.accentColor",
        kind: FieldKind::HexColor,
    },
    FieldSpec {
        path: "ui.showIcons",
        kind: FieldKind::Bool,
    },
    FieldSpec {
        path: "ui.compactMode",
        kind: FieldKind::Bool,
    },
    FieldSpec {
        path: "ui.refreshInterval",
        kind: FieldKind::Duration {
            min: Duration::from_millis(50),
            max: Duration::from_secs(10),
        },
    },
    FieldSpec {
        path: "performance.cacheSizeMb",
        kind: FieldKind::Integer { min: 1, max: 4096 },
    },
    FieldSpec {
        path: "performance.maxRetries",
        kind: FieldKind::Integer { min: 0, max: 10 },
    },
    FieldSpec {
        path: "timeouts.network",
        kind: FieldKind::Duration {
            min: Duration::from_secs(1),
            max: Duration::from_secs(600),
        },
    },
    FieldSpec {
        path: "timeouts.operation",
        kind: FieldKind::Duration {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3600),
        },
    },
    FieldSpec {
        path: "timeouts.shutdown",
        kind: FieldKind::Duration {
            min: Duration::from_millis(100),
            max: Duration::from_secs(60),
        },
    },
    FieldSpec {
        path: "paths.cacheDir",
        kind: FieldKind::Path { optional: false },
    },
    FieldSpec {
        path: "paths.dataDir",
        kind: FieldKind::Path { optional: false },
    },
    FieldSpec {
        path: "paths.logFile",
        kind: FieldKind::Path { optional: true },
    },
    FieldSpec {
        path: "network.proxyUrl",
        kind: FieldKind::Url { optional: true },
    },
    FieldSpec {
        path: "credentials.apiToken",
        kind: FieldKind::Secret,
    },
];

static HEX_COLOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").ok());

static PROXY_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:https?|socks5)://[^\s/:]+(?::\d{1,5})?(?:/\S*)?$").ok());

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

impl FieldSpec {
    /// Find a field by its dotted path.
    pub fn find(path: &str) -> Option<&'static FieldSpec> {
        FIELDS.iter().find(|f| f.path == path)
    }

    /// Path segments, e.g. `["ui", "accentColor"]`.
    pub fn segments(&self) -> impl Iterator<Item = &'static str> {
        self.path.split('.')
    }

    /// Environment variable suffix: `ui.accentColor` becomes `UI_ACCENT_COLOR`.
    pub fn env_suffix(&self) -> String {
        self.segments()
            .map(|s| s.to_shouty_snake_case())
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_secret(&self) -> bool {
        self.kind == FieldKind::Secret
    }
}

/// True if `name` is a top-level section (a prefix of some nested field).
pub fn is_section(name: &str) -> bool {
    FIELDS
        .iter()
        .any(|f| f.path.split_once('.').is_some_and(|(section, _)| section == name))
}

impl FieldKind {
    /// Check a raw value and return its canonical form.
    ///
    /// The canonical form is what `Config` deserializes from: booleans and
    /// integers as JSON scalars, durations as their text form, optional
    /// values as `null` when empty.
    pub fn coerce(&self, raw: &Value) -> Result<Value, String> {
        match self {
            FieldKind::Bool => coerce_bool(raw).map(Value::Bool),
            FieldKind::Integer { min, max } => {
                let n = coerce_integer(raw)?;
                if n < *min || n > *max {
                    return Err(format!("{} is out of range {}..={}", n, min, max));
                }
                Ok(Value::from(n))
            }
            FieldKind::Enum(allowed) => {
                let text = scalar_text(raw)?.to_ascii_lowercase();
                if allowed.contains(&text.as_str()) {
                    Ok(Value::String(text))
                } else {
                    Err(format!("'{}' is not one of {:?}", text, allowed))
                }
            }
            FieldKind::Duration { min, max } => {
                let text = match raw {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => {
                        return Err(format!("duration {} needs a unit (ms, s, m, h)", n));
                    }
                    other => return Err(format!("expected a duration, found {}", type_name(other))),
                };
                let parsed = duration::parse(&text)?;
                if parsed < *min || parsed > *max {
                    return Err(format!(
                        "{} is out of range {}..={}",
                        duration::format(parsed),
                        duration::format(*min),
                        duration::format(*max)
                    ));
                }
                Ok(Value::String(duration::format(parsed)))
            }
            FieldKind::HexColor => {
                let text = scalar_text(raw)?;
                if is_match(&HEX_COLOR, text.trim()) {
                    Ok(Value::String(text.trim().to_ascii_lowercase()))
                } else {
                    Err(format!("'{}' is not a hex color like #5f87ff", text))
                }
            }
            FieldKind::Url { optional } => {
                let text = optional_text(raw)?;
                match text {
                    None if *optional => Ok(Value::Null),
                    None => Err("must not be empty".to_string()),
                    Some(url) if is_match(&PROXY_URL, &url) => Ok(Value::String(url)),
                    Some(url) => Err(format!(
                        "'{}' is not an http(s):// or socks5:// URL",
                        url
                    )),
                }
            }
            FieldKind::Path { optional } => {
                let text = optional_text(raw)?;
                match text {
                    None if *optional => Ok(Value::Null),
                    None => Err("must not be empty".to_string()),
                    Some(path) if path.contains('\0') => {
                        Err("path contains a NUL byte".to_string())
                    }
                    Some(path) => Ok(Value::String(
                        paths::expand_tilde(&path).to_string_lossy().into_owned(),
                    )),
                }
            }
            FieldKind::Secret => match raw {
                Value::Null => Ok(Value::String(String::new())),
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(format!("expected a string, found {}", type_name(other))),
            },
        }
    }

    /// Short human description used in findings and `show` output.
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Bool => "boolean".to_string(),
            FieldKind::Integer { min, max } => format!("integer {}..={}", min, max),
            FieldKind::Enum(allowed) => format!("one of {}", allowed.join(", ")),
            FieldKind::Duration { min, max } => format!(
                "duration {}..={}",
                duration::format(*min),
                duration::format(*max)
            ),
            FieldKind::HexColor => "hex color".to_string(),
            FieldKind::Url { .. } => "proxy URL".to_string(),
            FieldKind::Path { .. } => "path".to_string(),
            FieldKind::Secret => "secret".to_string(),
        }
    }
}

fn coerce_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("expected a boolean, found {}", type_name(other))),
    }
}

fn coerce_integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64()
                && f.fract() == 0.0
                && f.abs() < i64::MAX as f64
            {
                Ok(f as i64)
            } else {
                Err(format!("{} is not an integer", n))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("expected an integer, found {}", type_name(other))),
    }
}

/// String form of a scalar; numbers and booleans are stringified.
fn scalar_text(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a string, found {}", type_name(other))),
    }
}

/// Like [`scalar_text`], with `null` and blank strings mapped to `None`.
fn optional_text(raw: &Value) -> Result<Option<String>, String> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        other => Err(format!("expected a string, found {}", type_name(other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a table",
    }
}

/// Look up a dotted path in a nested map.
pub fn get_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Insert at a dotted path, creating intermediate tables.
///
/// A non-table value in the way is replaced by a table.
pub fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}
