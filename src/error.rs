//! Error types for configuration loading, validation and secret resolution.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::format::Format;

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The field fell back to its default; loading continued.
    Warning,
    /// The finding blocks loading (strict mode, or a rejected unknown key).
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A per-field finding produced while merging and validating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Dotted field path, e.g. `ui.accentColor`.
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Same finding, escalated to blocking.
    pub fn escalate(mut self) -> Self {
        self.severity = Severity::Error;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Blocking configuration errors. A load that returns one of these produces no `Config`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be parsed at all.
    #[error("syntax error in {format} config {}: {message}", .path.display())]
    Syntax {
        path: PathBuf,
        format: Format,
        message: String,
    },

    /// Both a YAML and a TOML document exist for the same path stem.
    #[error(
        "conflicting config files: {} and {} both exist; remove one of them",
        .first.display(),
        .second.display()
    )]
    FormatConflict { first: PathBuf, second: PathBuf },

    /// An explicit path whose extension is neither YAML nor TOML.
    #[error("unsupported config file extension: {} (expected .yaml, .yml or .toml)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The document exists but could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Findings that block loading (strict mode or rejected keys).
    #[error("configuration is invalid: {}", join_findings(.0))]
    Invalid(Vec<ValidationError>),

    /// The validated field tree did not deserialize into a `Config`.
    #[error("failed to build configuration: {0}")]
    Build(#[from] serde_json::Error),

    /// The file watcher failed to start or reported a backend failure.
    #[error("config watch error: {0}")]
    Watch(String),
}

impl ConfigError {
    pub fn syntax(path: impl Into<PathBuf>, format: Format, message: impl fmt::Display) -> Self {
        ConfigError::Syntax {
            path: path.into(),
            format,
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// Findings carried by an `Invalid` error, empty otherwise.
    pub fn findings(&self) -> &[ValidationError] {
        match self {
            ConfigError::Invalid(findings) => findings,
            _ => &[],
        }
    }
}

impl From<notify::Error> for ConfigError {
    fn from(err: notify::Error) -> Self {
        ConfigError::Watch(err.to_string())
    }
}

fn join_findings(findings: &[ValidationError]) -> String {
    findings
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to resolve or produce an encrypted value.
///
/// Messages never include plaintext or key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("no key available for key id '{key_id}' (keychain and {env_var} both empty)")]
    KeyNotFound { key_id: String, env_var: String },

    #[error("invalid key id '{0}': expected 1-64 characters of [A-Za-z0-9_-]")]
    InvalidKeyId(String),

    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),

    #[error("decryption failed for key id '{key_id}': wrong key or tampered ciphertext")]
    Decrypt { key_id: String },

    #[error("encryption failed for key id '{key_id}'")]
    Encrypt { key_id: String },

    #[error("keychain error: {0}")]
    Keychain(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for secret operations.
pub type SecretResult<T> = std::result::Result<T, SecretError>;
