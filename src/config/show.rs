//! Human-readable rendering of a configuration.
//!
//! Secrets are never rendered: `SecretString` serializes as `********`, and
//! any other field whose value was decrypted is masked the same way.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::str::FromStr;

use super::loader::ResolvedConfig;
use super::merge::ConfigLayer;
use super::types::Config;

/// Output grammar for [`ResolvedConfig::show`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowFormat {
    #[default]
    Yaml,
    Toml,
    Json,
}

impl ShowFormat {
    pub const NAMES: &'static [&'static str] = &["yaml", "toml", "json"];
}

impl FromStr for ShowFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ShowFormat::Yaml),
            "toml" => Ok(ShowFormat::Toml),
            "json" => Ok(ShowFormat::Json),
            other => Err(format!(
                "unknown format '{}', expected one of {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// YAML dump preceded by a provenance header.
pub fn render_config(config: &Config) -> Result<String> {
    let mut out = header(config);
    out.push_str(
        &serde_yaml::to_string(&field_tree(config, ShowFormat::Yaml)?)
            .context("failed to render config as YAML")?,
    );
    Ok(out)
}

fn header(config: &Config) -> String {
    format!(
        "# loaded from: {}\n# version: {}\n",
        config.loaded_from, config.version
    )
}

/// The printable field tree: decrypted fields masked, and for TOML (which
/// has no null) unset optional fields left out.
fn field_tree(config: &Config, format: ShowFormat) -> Result<Value> {
    let mut tree = config
        .redacted_tree()
        .context("failed to serialize config")?;
    if format == ShowFormat::Toml {
        strip_nulls(&mut tree);
    }
    Ok(tree)
}

fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        map.values_mut().for_each(strip_nulls);
    }
}

impl ResolvedConfig {
    /// Render in `format`. YAML and TOML carry a comment block naming the
    /// layer behind every field that did not come from defaults.
    pub fn show(&self, format: ShowFormat) -> Result<String> {
        let tree = field_tree(&self.config, format)?;
        let body = match format {
            ShowFormat::Json => {
                return serde_json::to_string_pretty(&tree)
                    .context("failed to render config as JSON");
            }
            ShowFormat::Yaml => {
                serde_yaml::to_string(&tree).context("failed to render config as YAML")?
            }
            ShowFormat::Toml => {
                toml::to_string(&tree).context("failed to render config as TOML")?
            }
        };

        let mut out = header(&self.config);
        let overridden: Vec<_> = self
            .sources
            .iter()
            .filter(|(_, layer)| **layer != ConfigLayer::Defaults)
            .collect();
        if !overridden.is_empty() {
            out.push_str("# sources:\n");
            for (path, layer) in overridden {
                let _ = writeln!(out, "#   {} <- {}", path, layer);
            }
        }
        out.push('\n');
        out.push_str(&body);
        Ok(out)
    }
}
