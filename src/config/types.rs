//! Configuration types and structures.
//!
//! [`Config`] is the resolved, validated snapshot. It is only produced by the
//! loader and is shared behind `Arc`; a reload builds a new one.

use crate::logging::{LogLevel, Logger};
use crate::paths;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use super::duration;
use super::fields::{get_path, set_path};

/// Current document format version.
pub const CONFIG_VERSION: &str = "1";

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "TERMCONF";

/// `loaded_from` value when no document was read.
pub const LOADED_FROM_DEFAULTS: &str = "defaults";

/// Placeholder rendered instead of a secret's plaintext.
pub const REDACTED: &str = "********";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Colour theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the terminal background.
    #[default]
    Auto,
    Dark,
    Light,
}

/// Behavior for keys the schema does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyBehavior {
    /// Drop them silently.
    Allow,
    /// Drop them and record a warning finding (default).
    #[default]
    Warn,
    /// Record an error finding; blocks loading.
    Reject,
}

/// A string that never prints its contents.
///
/// `Debug`, `Display` and `Serialize` all redact. The plaintext is only
/// reachable through [`SecretString::expose`] and is zeroed on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn redacted(&self) -> &'static str {
        if self.is_empty() { "" } else { REDACTED }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString({:?})", self.redacted())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.redacted())
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.redacted())
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

/// Resolved configuration snapshot.
///
/// `Debug` and the renderers mask every field listed in `sealed_fields`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Document format version.
    pub version: String,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    /// Upper bound on concurrently running operations (1..=16).
    pub max_concurrent_ops: u32,
    /// Never prompt; fail instead.
    pub non_interactive: bool,
    /// Watch the backing file and reload on change.
    pub hot_reload: bool,
    pub ui: UiConfig,
    pub performance: PerformanceConfig,
    pub timeouts: TimeoutsConfig,
    pub paths: PathsConfig,
    pub network: NetworkConfig,
    pub credentials: CredentialsConfig,

    /// `"defaults"` or the path of the document that was read.
    #[serde(skip, default = "defaults_marker")]
    pub loaded_from: String,

    /// Dotted paths whose value was decrypted while loading.
    #[serde(skip)]
    pub sealed_fields: BTreeSet<String>,
}

fn defaults_marker() -> String {
    LOADED_FROM_DEFAULTS.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            log_level: LogLevel::Info,
            log_format: LogFormat::Text,
            max_concurrent_ops: 4,
            non_interactive: false,
            hot_reload: true,
            ui: UiConfig::default(),
            performance: PerformanceConfig::default(),
            timeouts: TimeoutsConfig::default(),
            paths: PathsConfig::default(),
            network: NetworkConfig::default(),
            credentials: CredentialsConfig::default(),
            loaded_from: LOADED_FROM_DEFAULTS.to_string(),
            sealed_fields: BTreeSet::new(),
        }
    }
}

impl Config {
    /// True when no document contributed to this snapshot.
    pub fn is_from_defaults(&self) -> bool {
        self.loaded_from == LOADED_FROM_DEFAULTS
    }

    /// The serialized field tree with every sealed field replaced by [`REDACTED`].
    pub fn redacted_tree(&self) -> serde_json::Result<Value> {
        let mut tree = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut tree {
            for path in &self.sealed_fields {
                if get_path(map, path).is_some_and(|value| !value.is_null()) {
                    set_path(map, path, Value::String(REDACTED.to_string()));
                }
            }
        }
        Ok(tree)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.redacted_tree().map_err(|_| fmt::Error)?;
        f.debug_struct("Config")
            .field("loaded_from", &self.loaded_from)
            .field("fields", &tree)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    pub theme: Theme,
    /// `#rgb` or `#rrggbb`.
    pub accent_color: String,
    pub show_icons: bool,
    pub compact_mode: bool,
    /// Redraw interval for live views.
    #[serde(with = "duration::serde_text")]
    pub refresh_interval: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Auto,
            accent_color: "#5f87ff".to_string(),
            show_icons: true,
            compact_mode: false,
            refresh_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    pub cache_size_mb: u32,
    pub max_retries: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 256,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(with = "duration::serde_text")]
    pub network: Duration,
    #[serde(with = "duration::serde_text")]
    pub operation: Duration,
    /// Grace period for in-flight work at exit.
    #[serde(with = "duration::serde_text")]
    pub shutdown: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            network: Duration::from_secs(30),
            operation: Duration::from_secs(300),
            shutdown: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: paths::default_cache_dir(),
            data_dir: paths::default_data_dir(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    /// May be written in the document as an `encrypted:v1` value.
    pub api_token: SecretString,
}

/// Settings that may come from the command line. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliFlags {
    pub log_level: Option<String>,
    pub non_interactive: Option<bool>,
    pub max_concurrent_ops: Option<i64>,
    pub theme: Option<String>,
    pub hot_reload: Option<bool>,
}

impl CliFlags {
    /// The CLI precedence layer, shaped like a parsed document.
    pub fn to_layer(&self) -> Map<String, Value> {
        let mut layer = Map::new();

        if let Some(level) = self.log_level.as_deref().filter(|s| !s.trim().is_empty()) {
            layer.insert("logLevel".to_string(), Value::String(level.to_string()));
        }
        if let Some(flag) = self.non_interactive {
            layer.insert("nonInteractive".to_string(), Value::Bool(flag));
        }
        if let Some(ops) = self.max_concurrent_ops {
            layer.insert("maxConcurrentOps".to_string(), Value::from(ops));
        }
        if let Some(theme) = self.theme.as_deref().filter(|s| !s.trim().is_empty()) {
            let mut ui = Map::new();
            ui.insert("theme".to_string(), Value::String(theme.to_string()));
            layer.insert("ui".to_string(), Value::Object(ui));
        }
        if let Some(flag) = self.hot_reload {
            layer.insert("hotReload".to_string(), Value::Bool(flag));
        }

        layer
    }
}

/// Input to [`Loader::load`](super::Loader::load).
#[derive(Clone)]
pub struct LoadOptions {
    /// Explicit document path. `None` searches `search_dir` (or the default config dir).
    pub path: Option<PathBuf>,
    /// Directory searched for `config.{yaml,yml,toml}` when `path` is `None`.
    pub search_dir: Option<PathBuf>,
    /// Environment variable prefix, without the trailing underscore.
    pub env_prefix: String,
    pub cli: CliFlags,
    /// Escalate every semantic finding to blocking.
    pub strict: bool,
    pub unknown_keys: UnknownKeyBehavior,
    /// Environment snapshot. `None` reads the process environment at load time.
    pub env: Option<HashMap<String, String>>,
    pub logger: Option<Arc<dyn Logger>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            path: None,
            search_dir: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            cli: CliFlags::default(),
            strict: false,
            unknown_keys: UnknownKeyBehavior::default(),
            env: None,
            logger: None,
        }
    }
}

impl LoadOptions {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn with_cli(mut self, cli: CliFlags) -> Self {
        self.cli = cli;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_unknown_keys(mut self, behavior: UnknownKeyBehavior) -> Self {
        self.unknown_keys = behavior;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("path", &self.path)
            .field("search_dir", &self.search_dir)
            .field("env_prefix", &self.env_prefix)
            .field("cli", &self.cli)
            .field("strict", &self.strict)
            .field("unknown_keys", &self.unknown_keys)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_prints() {
        let secret = SecretString::new("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert!(!secret.to_string().contains("hunter2"));
        assert_eq!(serde_json::to_value(&secret).unwrap(), Value::from(REDACTED));
    }

    #[test]
    fn test_empty_secret_serializes_empty() {
        let secret = SecretString::default();
        assert_eq!(serde_json::to_value(&secret).unwrap(), Value::from(""));
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = Config::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["ui"]["refreshInterval"], "250ms");
        assert_eq!(value["timeouts"]["operation"], "5m");
        assert_eq!(value["paths"]["logFile"], Value::Null);

        let back: Config = serde_json::from_value(value).unwrap();
        assert_eq!(back.timeouts, config.timeouts);
        assert_eq!(back.ui, config.ui);
    }

    #[test]
    fn test_sealed_fields_are_masked() {
        let mut config = Config::default();
        config.network.proxy_url = Some("http://user:pw@proxy.local:3128".to_string());
        config.sealed_fields.insert("network.proxyUrl".to_string());
        // Sealed but still null: stays null.
        config.sealed_fields.insert("paths.logFile".to_string());

        let tree = config.redacted_tree().unwrap();
        assert_eq!(tree["network"]["proxyUrl"], Value::from(REDACTED));
        assert_eq!(tree["paths"]["logFile"], Value::Null);
        assert!(!format!("{:?}", config).contains("proxy.local"));
    }

    #[test]
    fn test_cli_layer_skips_empty_strings() {
        let flags = CliFlags {
            log_level: Some(String::new()),
            theme: Some("  ".to_string()),
            non_interactive: Some(true),
            ..Default::default()
        };
        let layer = flags.to_layer();
        assert!(!layer.contains_key("logLevel"));
        assert!(!layer.contains_key("ui"));
        assert_eq!(layer["nonInteractive"], Value::Bool(true));
    }
}
