//! Document discovery and parsing.
//!
//! Two interchangeable grammars, picked by extension: YAML (`.yaml`, `.yml`)
//! and TOML (`.toml`). Both parse into the same `serde_json` map shape.

use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::fields::{FieldSpec, is_section};
use super::types::UnknownKeyBehavior;
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::paths::CONFIG_FILE_STEM;

/// Supported document grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => write!(f, "YAML"),
            Format::Toml => write!(f, "TOML"),
        }
    }
}

/// Candidate file extensions, in discovery order.
const EXTENSIONS: &[(&str, Format)] = &[
    ("yaml", Format::Yaml),
    ("yml", Format::Yaml),
    ("toml", Format::Toml),
];

impl Format {
    /// Pick the grammar from a path's extension.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, format)| *format)
    }

    /// Parse document text into a field map.
    ///
    /// A document containing only comments or whitespace yields `Ok(None)`.
    pub fn parse(&self, text: &str) -> Result<Option<Map<String, Value>>, String> {
        if is_blank(text) {
            return Ok(None);
        }

        let value: Value = match self {
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string())?,
            Format::Toml => toml::from_str(text).map_err(|e| e.to_string())?,
        };

        match value {
            Value::Object(map) => Ok(Some(map)),
            Value::Null => Ok(None),
            other => Err(format!(
                "top level must be a mapping of settings, found {}",
                match other {
                    Value::Array(_) => "a list",
                    Value::String(_) => "a string",
                    Value::Number(_) => "a number",
                    _ => "a scalar",
                }
            )),
        }
    }
}

/// Only whitespace and `#` comments. Both grammars use `#` for comments.
fn is_blank(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

/// A parsed document with its advisories.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub format: Format,
    /// Known fields only; unknown keys have been removed.
    pub fields: Map<String, Value>,
    /// Unknown-key advisories.
    pub findings: Vec<ValidationError>,
}

/// Search `dir` for `config.{yaml,yml,toml}`.
///
/// Returns `Ok(None)` if none exists and a conflict error if more than one does.
pub fn discover(dir: &Path) -> ConfigResult<Option<(PathBuf, Format)>> {
    let found: Vec<(PathBuf, Format)> = EXTENSIONS
        .iter()
        .map(|(ext, format)| (dir.join(format!("{}.{}", CONFIG_FILE_STEM, ext)), *format))
        .filter(|(path, _)| path.is_file())
        .collect();

    match found.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(single.clone())),
        [first, second, ..] => Err(ConfigError::FormatConflict {
            first: first.0.clone(),
            second: second.0.clone(),
        }),
    }
}

/// Fail if a sibling of `path` with the same stem exists in another grammar.
pub fn check_conflict(path: &Path) -> ConfigResult<()> {
    let Some(stem) = path.file_stem() else {
        return Ok(());
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    for (ext, _) in EXTENSIONS {
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(ext);
        let sibling = dir.join(name);
        if sibling.file_name() != path.file_name() && sibling.is_file() {
            return Err(ConfigError::FormatConflict {
                first: path.to_path_buf(),
                second: sibling,
            });
        }
    }
    Ok(())
}

/// Read and parse a document.
///
/// `explicit` marks a path the caller asked for by name: a missing or empty
/// file is then an error instead of an empty document.
pub fn read_document(
    path: &Path,
    explicit: bool,
    unknown_keys: UnknownKeyBehavior,
) -> ConfigResult<Document> {
    let format = Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

    let fields = match format.parse(&text) {
        Ok(Some(map)) => map,
        Ok(None) if explicit => {
            return Err(ConfigError::syntax(path, format, "document is empty"));
        }
        Ok(None) => {
            debug!(path = %path.display(), "Config document is empty, using defaults");
            Map::new()
        }
        Err(message) => return Err(ConfigError::syntax(path, format, message)),
    };

    let mut document = Document {
        path: path.to_path_buf(),
        format,
        fields,
        findings: Vec::new(),
    };
    document.findings = strip_unknown_keys(&mut document.fields, unknown_keys);
    Ok(document)
}

/// Remove keys the registry does not know, returning one advisory per key.
pub fn strip_unknown_keys(
    fields: &mut Map<String, Value>,
    behavior: UnknownKeyBehavior,
) -> Vec<ValidationError> {
    let mut unknown: Vec<String> = Vec::new();
    let mut findings = Vec::new();

    let top_keys: Vec<String> = fields.keys().cloned().collect();
    for key in top_keys {
        if FieldSpec::find(&key).is_some() {
            continue;
        }
        if !is_section(&key) {
            fields.remove(&key);
            unknown.push(key);
            continue;
        }

        if let Some(Value::Object(section)) = fields.get_mut(&key) {
            let child_keys: Vec<String> = section.keys().cloned().collect();
            for child in child_keys {
                let path = format!("{}.{}", key, child);
                if FieldSpec::find(&path).is_none() {
                    section.remove(&child);
                    unknown.push(path);
                }
            }
            continue;
        }

        if let Some(value) = fields.remove(&key)
            && !value.is_null()
        {
            findings.push(ValidationError::warning(
                key.as_str(),
                "expected a table of settings; section ignored",
            ));
        }
    }

    for key in unknown {
        let message = "unknown key ignored";
        match behavior {
            UnknownKeyBehavior::Allow => {}
            UnknownKeyBehavior::Warn => findings.push(ValidationError::warning(key, message)),
            UnknownKeyBehavior::Reject => {
                findings.push(ValidationError::error(key, "unknown key not allowed"))
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("a/config.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("config.YAML")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("config.toml")), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("config.json")), None);
        assert_eq!(Format::from_path(Path::new("config")), None);
    }

    #[test]
    fn test_both_grammars_produce_same_shape() {
        let yaml = "logLevel: debug\nui:\n  theme: dark\n";
        let toml = "logLevel = \"debug\"\n[ui]\ntheme = \"dark\"\n";
        assert_eq!(
            Format::Yaml.parse(yaml).unwrap(),
            Format::Toml.parse(toml).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        assert!(Format::Yaml.parse("- a\n- b\n").is_err());
        assert!(Format::Yaml.parse("key: [unclosed").is_err());
        assert!(Format::Toml.parse("key = ").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Format::Yaml.parse("  \n").unwrap(), None);
        assert_eq!(Format::Yaml.parse("# only a comment\n").unwrap(), None);
    }

    #[test]
    fn test_discover_none() {
        let temp = TempDir::new().unwrap();
        assert!(discover(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_discover_single() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "logLevel = \"warn\"").unwrap();
        let (path, format) = discover(temp.path()).unwrap().unwrap();
        assert!(path.ends_with("config.toml"));
        assert_eq!(format, Format::Toml);
    }

    #[test]
    fn test_discover_conflict() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.yml"), "logLevel: warn").unwrap();
        std::fs::write(temp.path().join("config.toml"), "logLevel = \"warn\"").unwrap();
        let err = discover(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FormatConflict { .. }));
    }

    #[test]
    fn test_explicit_path_conflict() {
        let temp = TempDir::new().unwrap();
        let yaml = temp.path().join("app.yaml");
        std::fs::write(&yaml, "logLevel: warn").unwrap();
        assert!(check_conflict(&yaml).is_ok());

        std::fs::write(temp.path().join("app.toml"), "").unwrap();
        assert!(matches!(
            check_conflict(&yaml),
            Err(ConfigError::FormatConflict { .. })
        ));
    }

    #[test]
    fn test_explicit_empty_document_is_syntax_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "").unwrap();

        let err = read_document(&path, true, UnknownKeyBehavior::Warn).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { .. }));

        let doc = read_document(&path, false, UnknownKeyBehavior::Warn).unwrap();
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn test_syntax_error_carries_diagnostic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "logLevel: [debug\n").unwrap();

        match read_document(&path, true, UnknownKeyBehavior::Warn) {
            Err(ConfigError::Syntax { format, message, .. }) => {
                assert_eq!(format, Format::Yaml);
                assert!(!message.is_empty());
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_warn() {
        let mut fields = json!({
            "logLevel": "info",
            "plugins": ["a"],
            "ui": {"theme": "dark", "sparkles": true},
            "credentials": null
        })
        .as_object()
        .unwrap()
        .clone();

        let findings = strip_unknown_keys(&mut fields, UnknownKeyBehavior::Warn);
        let keys: Vec<_> = findings.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(keys, vec!["plugins", "ui.sparkles"]);
        assert!(findings.iter().all(|f| !f.is_error()));
        assert!(!fields.contains_key("plugins"));
        assert_eq!(fields["ui"], json!({"theme": "dark"}));
        assert!(!fields.contains_key("credentials"));
    }

    #[test]
    fn test_unknown_keys_policies() {
        let base = json!({"plugins": 1}).as_object().unwrap().clone();

        let mut fields = base.clone();
        assert!(strip_unknown_keys(&mut fields, UnknownKeyBehavior::Allow).is_empty());
        assert!(fields.is_empty());

        let mut fields = base;
        let findings = strip_unknown_keys(&mut fields, UnknownKeyBehavior::Reject);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_error());
    }

    #[test]
    fn test_section_with_scalar_is_dropped() {
        let mut fields = json!({"ui": 5}).as_object().unwrap().clone();
        let findings = strip_unknown_keys(&mut fields, UnknownKeyBehavior::Warn);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field, "ui");
        assert!(fields.is_empty());
    }
}
