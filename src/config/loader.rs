//! Configuration loader.
//!
//! Parses the document (if any), maps the environment, merges the CLI,
//! environment and file layers field by field, resolves encrypted values and
//! validates. The result is an immutable [`Config`] plus non-fatal findings.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::env::{map_env, process_env};
use super::format::{self, Document};
use super::merge::{ConfigLayer, FieldSources, Layers, MergedField, merge};
use super::types::{CliFlags, Config, LOADED_FROM_DEFAULTS, LoadOptions};
use super::validate::{apply_strict, check_config, validate_merged};
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::logging::{Logger, TracingLogger};
use crate::paths;
use crate::secrets::{Encryptor, KeychainManager, is_tagged};

/// A loaded configuration with everything learned while loading it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// Non-blocking findings, in the order they were produced.
    pub findings: Vec<ValidationError>,
    /// Which layer supplied each field.
    pub sources: FieldSources,
}

/// Builds [`Config`] snapshots.
///
/// The loader owns its secret resolver; construct one per application and
/// hand it to whoever needs to load (including the watcher).
#[derive(Debug, Clone)]
pub struct Loader {
    encryptor: Encryptor,
}

impl Loader {
    pub fn new(keychain: Arc<KeychainManager>) -> Self {
        Self {
            encryptor: Encryptor::new(keychain),
        }
    }

    /// Loader resolving keys through the operating system's credential store.
    pub fn with_platform_keychain() -> Self {
        Self::new(Arc::new(KeychainManager::platform()))
    }

    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Load a configuration snapshot.
    ///
    /// Blocking errors: a missing explicit document, an unreadable or
    /// malformed document, a format conflict, and (in strict mode, or for
    /// rejected unknown keys) any error-severity finding.
    pub fn load(&self, options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        let logger: Arc<dyn Logger> = options
            .logger
            .clone()
            .unwrap_or_else(|| Arc::new(TracingLogger::new().with_name("config")));

        let document = resolve_document(options)?;
        let mut findings = Vec::new();
        let mut layers = Layers::default();
        if let Some(doc) = &document {
            logger.debug(&format!(
                "Parsed {} config document {}",
                doc.format,
                doc.path.display()
            ));
            findings.extend(doc.findings.iter().cloned());
            layers.file = doc.fields.clone();
        } else {
            logger.debug("No config document found, using defaults");
        }

        layers.env = match &options.env {
            Some(env) => map_env(&options.env_prefix, env),
            None => map_env(&options.env_prefix, &process_env()),
        };
        layers.cli = options.cli.to_layer();

        // Key fallback variables follow this load's prefix and environment.
        let encryptor = self
            .encryptor
            .scoped(&options.env_prefix, options.env.as_ref());
        let mut merged = merge(&layers);
        findings.extend(resolve_secrets(&encryptor, &mut merged, logger.as_ref()));

        let validated = validate_merged(&merged)?;
        findings.extend(validated.findings);

        let findings = apply_strict(findings, options.strict);
        let blocking: Vec<ValidationError> =
            findings.iter().filter(|f| f.is_error()).cloned().collect();
        if !blocking.is_empty() {
            logger.error(&format!(
                "Configuration rejected with {} blocking finding(s)",
                blocking.len()
            ));
            return Err(ConfigError::Invalid(blocking));
        }

        for finding in &findings {
            logger.warn(&finding.to_string());
        }

        let mut config = validated.config;
        config.loaded_from = match &document {
            Some(doc) => doc.path.display().to_string(),
            None => LOADED_FROM_DEFAULTS.to_string(),
        };
        config.sealed_fields = merged
            .iter()
            .filter(|field| {
                field.decrypted
                    && validated
                        .sources
                        .get(field.spec.path)
                        .is_some_and(|layer| *layer != ConfigLayer::Defaults)
            })
            .map(|field| field.spec.path.to_string())
            .collect();
        logger.info(&format!(
            "Configuration loaded from {} ({} warning(s))",
            config.loaded_from,
            findings.len()
        ));

        Ok(ResolvedConfig {
            config,
            findings,
            sources: validated.sources,
        })
    }

    /// The built-in default configuration.
    pub fn get_defaults() -> Config {
        Config::default()
    }

    /// Human-readable dump with provenance. Secrets are redacted.
    pub fn print_config(config: &Config) -> anyhow::Result<String> {
        super::show::render_config(config)
    }

    /// Re-check a built configuration without modifying it.
    pub fn validate(&self, config: &Config) -> Vec<ValidationError> {
        check_config(config)
    }
}

/// Load with default options, the process environment and the platform keychain.
pub fn load(cli: &CliFlags) -> ConfigResult<ResolvedConfig> {
    Loader::with_platform_keychain().load(&LoadOptions::default().with_cli(cli.clone()))
}

/// Decrypt tagged values in place. A value that cannot be decrypted is
/// dropped (the field falls back to its default) and reported.
fn resolve_secrets(
    encryptor: &Encryptor,
    merged: &mut [MergedField],
    logger: &dyn Logger,
) -> Vec<ValidationError> {
    let mut findings = Vec::new();
    for field in merged.iter_mut() {
        let Some(Value::String(raw)) = &field.raw else {
            continue;
        };
        if !is_tagged(raw) {
            continue;
        }

        match encryptor.decrypt_str(raw) {
            Ok(secret) => {
                field.raw = Some(Value::String(secret.expose().to_string()));
                field.decrypted = true;
                logger.debug(&format!("Resolved encrypted value for {}", field.spec.path));
            }
            Err(e) => {
                findings.push(ValidationError::warning(
                    field.spec.path,
                    format!(
                        "cannot resolve encrypted value (from {}): {}; using default",
                        field.source, e
                    ),
                ));
                field.reset();
            }
        }
    }
    findings
}

/// Find and parse the document selected by `options`, if any.
fn resolve_document(options: &LoadOptions) -> ConfigResult<Option<Document>> {
    if let Some(path) = &options.path {
        let path = expand(path);
        format::check_conflict(&path)?;
        return format::read_document(&path, true, options.unknown_keys).map(Some);
    }

    let dir = options
        .search_dir
        .clone()
        .unwrap_or_else(paths::default_config_dir);
    match format::discover(&dir)? {
        Some((path, _)) => format::read_document(&path, false, options.unknown_keys).map(Some),
        None => Ok(None),
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => paths::expand_tilde(text),
        None => path.to_path_buf(),
    }
}
