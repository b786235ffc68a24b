//! Per-field precedence merge.
//!
//! Every known field is resolved on its own: the first layer, in precedence
//! order CLI > environment > file, that holds a non-null value for the field
//! wins. A field absent from all of them keeps its default. Whole layers are
//! never preferred over each other.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::fields::{FIELDS, FieldSpec, get_path};

/// Where a field's value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    Defaults = 0,
    File = 1,
    Environment = 2,
    Cli = 3,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLayer::Defaults => write!(f, "defaults"),
            ConfigLayer::File => write!(f, "file"),
            ConfigLayer::Environment => write!(f, "environment"),
            ConfigLayer::Cli => write!(f, "cli"),
        }
    }
}

/// Winning layer per dotted field path.
pub type FieldSources = BTreeMap<&'static str, ConfigLayer>;

/// The non-default layers, each shaped like a parsed document.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub cli: Map<String, Value>,
    pub env: Map<String, Value>,
    pub file: Map<String, Value>,
}

impl Layers {
    /// Layers in precedence order, highest first.
    fn ordered(&self) -> [(ConfigLayer, &Map<String, Value>); 3] {
        [
            (ConfigLayer::Cli, &self.cli),
            (ConfigLayer::Environment, &self.env),
            (ConfigLayer::File, &self.file),
        ]
    }
}

/// The winning raw value for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    pub spec: &'static FieldSpec,
    pub source: ConfigLayer,
    /// `None` when the field keeps its default.
    pub raw: Option<Value>,
    /// The raw value is decrypted plaintext and must not appear in messages.
    pub decrypted: bool,
}

impl MergedField {
    /// Drop the winning value; the field falls back to its default.
    pub fn reset(&mut self) {
        self.source = ConfigLayer::Defaults;
        self.raw = None;
        self.decrypted = false;
    }
}

/// Select each field's winning raw value, in registry order.
pub fn merge(layers: &Layers) -> Vec<MergedField> {
    FIELDS
        .iter()
        .map(|spec| {
            let winner = layers.ordered().into_iter().find_map(|(layer, fields)| {
                get_path(fields, spec.path)
                    .filter(|value| !value.is_null())
                    .map(|value| (layer, value.clone()))
            });
            match winner {
                Some((source, raw)) => MergedField {
                    spec,
                    source,
                    raw: Some(raw),
                    decrypted: false,
                },
                None => MergedField {
                    spec,
                    source: ConfigLayer::Defaults,
                    raw: None,
                    decrypted: false,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn winner<'a>(merged: &'a [MergedField], path: &str) -> &'a MergedField {
        merged.iter().find(|m| m.spec.path == path).unwrap()
    }

    #[test]
    fn test_precedence_is_per_field() {
        let layers = Layers {
            cli: map(json!({"logLevel": "error"})),
            env: map(json!({"logLevel": "debug", "maxConcurrentOps": "8"})),
            file: map(json!({
                "logLevel": "info",
                "maxConcurrentOps": 2,
                "ui": {"theme": "dark"}
            })),
        };
        let merged = merge(&layers);

        let level = winner(&merged, "logLevel");
        assert_eq!(level.source, ConfigLayer::Cli);
        assert_eq!(level.raw, Some(json!("error")));

        let ops = winner(&merged, "maxConcurrentOps");
        assert_eq!(ops.source, ConfigLayer::Environment);
        assert_eq!(ops.raw, Some(json!("8")));

        let theme = winner(&merged, "ui.theme");
        assert_eq!(theme.source, ConfigLayer::File);

        let icons = winner(&merged, "ui.showIcons");
        assert_eq!(icons.source, ConfigLayer::Defaults);
        assert_eq!(icons.raw, None);
    }

    #[test]
    fn test_null_is_absent() {
        let layers = Layers {
            cli: Map::new(),
            env: Map::new(),
            file: map(json!({"logLevel": null, "network": {"proxyUrl": null}})),
        };
        let merged = merge(&layers);
        assert_eq!(winner(&merged, "logLevel").source, ConfigLayer::Defaults);
        assert_eq!(winner(&merged, "network.proxyUrl").source, ConfigLayer::Defaults);
    }

    #[test]
    fn test_every_field_is_reported() {
        let merged = merge(&Layers::default());
        assert_eq!(merged.len(), FIELDS.len());
        assert!(merged.iter().all(|m| m.source == ConfigLayer::Defaults));
    }

    #[test]
    fn test_reset_falls_back() {
        let layers = Layers {
            file: map(json!({"hotReload": false})),
            ..Default::default()
        };
        let mut merged = merge(&layers);
        let field = merged.iter_mut().find(|m| m.spec.path == "hotReload").unwrap();
        field.reset();
        assert_eq!(field.source, ConfigLayer::Defaults);
        assert!(field.raw.is_none());
    }

    #[test]
    fn test_layer_order() {
        assert!(ConfigLayer::Cli > ConfigLayer::Environment);
        assert!(ConfigLayer::Environment > ConfigLayer::File);
        assert!(ConfigLayer::File > ConfigLayer::Defaults);
        assert_eq!(ConfigLayer::Environment.to_string(), "environment");
    }
}
