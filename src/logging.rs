//! Logging capability for the configuration subsystem.
//!
//! The loader and watcher never talk to a subscriber directly. They log
//! through a [`Logger`], which defaults to [`TracingLogger`] (forwarding to
//! `tracing`) but can be swapped for anything that implements the trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Log level, also the value type of the `logLevel` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Accepted spellings, in severity order.
    pub const NAMES: &'static [&'static str] = &["debug", "info", "warn", "error"];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}', expected one of {:?}",
                other,
                LogLevel::NAMES
            )),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Atomic minimum-level filter that can be adjusted at runtime, e.g. after a reload.
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level_to_u8(level)))
    }

    pub fn get(&self) -> LogLevel {
        u8_to_level(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: LogLevel) {
        self.0.store(level_to_u8(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level_to_u8(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

fn level_to_u8(level: LogLevel) -> u8 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warn => 2,
        LogLevel::Error => 3,
    }
}

fn u8_to_level(val: u8) -> LogLevel {
    match val {
        0 => LogLevel::Debug,
        1 => LogLevel::Info,
        2 => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

/// Injectable logging capability.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Default [`Logger`] that forwards to `tracing`.
#[derive(Clone, Default)]
pub struct TracingLogger {
    level_filter: Arc<LogLevelFilter>,
    name: Option<String>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if !self.level_filter.should_log(level) {
            return;
        }

        let name = self.name.as_deref().unwrap_or("termconf");
        match level {
            LogLevel::Error => tracing::error!(logger = %name, "{}", message),
            LogLevel::Warn => tracing::warn!(logger = %name, "{}", message),
            LogLevel::Info => tracing::info!(logger = %name, "{}", message),
            LogLevel::Debug => tracing::debug!(logger = %name, "{}", message),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// `destination` is `0`/`off`, `1`/`stdout`, `2`/`stderr`, or a file name
/// (appended, no ANSI colours). `json` switches to the JSON formatter.
pub fn init_tracing(destination: &str, level: LogLevel, json: bool) -> anyhow::Result<()> {
    let level: Level = level.into();
    match destination {
        "0" | "off" => {}
        "1" | "stdout" => {
            let builder = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout);
            if json {
                tracing::subscriber::set_global_default(builder.json().finish())?;
            } else {
                tracing::subscriber::set_global_default(builder.finish())?;
            }
        }
        "2" | "stderr" => {
            let builder = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr);
            if json {
                tracing::subscriber::set_global_default(builder.json().finish())?;
            } else {
                tracing::subscriber::set_global_default(builder.finish())?;
            }
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let builder = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false);
            if json {
                tracing::subscriber::set_global_default(builder.json().finish())?;
            } else {
                tracing::subscriber::set_global_default(builder.finish())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let filter = LogLevelFilter::new(LogLevel::Warn);

        assert!(!filter.should_log(LogLevel::Debug));
        assert!(!filter.should_log(LogLevel::Info));
        assert!(filter.should_log(LogLevel::Warn));
        assert!(filter.should_log(LogLevel::Error));
    }

    #[test]
    fn test_level_filter_update() {
        let filter = LogLevelFilter::new(LogLevel::Debug);
        assert!(filter.should_log(LogLevel::Debug));

        filter.set(LogLevel::Error);
        assert!(!filter.should_log(LogLevel::Debug));
        assert!(!filter.should_log(LogLevel::Warn));
        assert!(filter.should_log(LogLevel::Error));
    }

    #[test]
    fn test_level_roundtrip() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            let filter = LogLevelFilter::new(level);
            assert_eq!(filter.get(), level);
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_to_tracing() {
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }
}
