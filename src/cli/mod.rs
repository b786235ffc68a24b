//! CLI command definitions for termconf
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod secrets;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrets::{EncryptArgs, KeygenArgs};
use std::path::PathBuf;

use crate::config::{CliFlags, LoadOptions, ShowFormat, UnknownKeyBehavior};
use crate::logging::LogLevel;

/// Policy for keys the document schema does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnknownKeys {
    Allow,
    #[default]
    Warn,
    Reject,
}

impl From<UnknownKeys> for UnknownKeyBehavior {
    fn from(keys: UnknownKeys) -> Self {
        match keys {
            UnknownKeys::Allow => UnknownKeyBehavior::Allow,
            UnknownKeys::Warn => UnknownKeyBehavior::Warn,
            UnknownKeys::Reject => UnknownKeyBehavior::Reject,
        }
    }
}

/// Layered configuration inspector and secret tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: search the config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level override: debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Never prompt
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Treat every validation finding as an error
    #[arg(long, global = true)]
    pub strict: bool,

    /// Unknown-key policy
    #[arg(long, value_enum, default_value_t = UnknownKeys::Warn, global = true)]
    pub unknown_keys: UnknownKeys,

    /// Environment variable prefix
    #[arg(long, default_value = "TERMCONF", global = true)]
    pub env_prefix: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and print the resolved configuration (default if no subcommand given)
    Show(ShowArgs),

    /// Load in strict mode and report every finding
    Validate,

    /// Encrypt a value for embedding in the config document
    Encrypt(EncryptArgs),

    /// Generate key material for encrypted values
    Keygen(KeygenArgs),

    /// Load, then reload on every change to the config file until Ctrl-C
    Watch,
}

/// Arguments for the show subcommand
#[derive(Args, Debug, Default)]
pub struct ShowArgs {
    /// Output format
    #[arg(
        short,
        long,
        default_value = "yaml",
        value_parser = PossibleValuesParser::new(ShowFormat::NAMES.iter().copied())
            .try_map(|s| s.parse::<ShowFormat>())
    )]
    pub format: ShowFormat,
}

impl Cli {
    /// The settings this invocation overrides. Flags that were not given stay unset.
    pub fn flags(&self) -> CliFlags {
        CliFlags {
            log_level: self.log_level.clone(),
            non_interactive: self.non_interactive.then_some(true),
            ..Default::default()
        }
    }

    /// Loader input for this invocation.
    pub fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::default()
            .with_cli(self.flags())
            .with_env_prefix(self.env_prefix.clone())
            .with_unknown_keys(self.unknown_keys.into())
            .strict(self.strict);
        if let Some(path) = &self.config {
            options = options.with_path(path.clone());
        }
        options
    }

    /// Level for the log subscriber before the config is loaded.
    pub fn bootstrap_log_level(&self) -> LogLevel {
        if self.verbose {
            return LogLevel::Debug;
        }
        self.log_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or(LogLevel::Warn)
    }
}
