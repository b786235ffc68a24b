//! Layered configuration.
//!
//! A [`Config`] is built from four layers, resolved per field with
//! precedence CLI > environment > file > defaults:
//!
//! 1. **Defaults** - compiled in ([`Config::default`])
//! 2. **File** - `config.yaml`, `config.yml` or `config.toml` (at most one)
//! 3. **Environment** - `TERMCONF_LOG_LEVEL`, `TERMCONF_UI_THEME`, ...
//! 4. **CLI** - [`CliFlags`]
//!
//! ## Failure policy
//! - A malformed document or a YAML/TOML conflict blocks loading.
//! - An invalid individual value falls back to its default with a warning
//!   (blocking only in strict mode).
//! - An `encrypted:v1` value that cannot be decrypted is an invalid value.
//!
//! ## Environment Variables
//! - `TERMCONF_CONFIG_DIR` - Directory searched for the document
//! - `TERMCONF_<FIELD>` / `TERMCONF_<SECTION>_<FIELD>` - Setting overrides
//! - `TERMCONF_ENCRYPTION_KEY_<KEYID>` - Key material fallback

pub mod duration;
pub mod env;
pub mod fields;
pub mod format;
mod loader;
pub mod merge;
mod show;
mod types;
pub mod validate;
mod watcher;

pub use format::Format;
pub use loader::{Loader, ResolvedConfig, load};
pub use merge::{ConfigLayer, FieldSources};
pub use show::{ShowFormat, render_config};
pub use types::*;
pub use watcher::{
    DEFAULT_DEBOUNCE, LiveConfig, WatchEvent, WatchEventKind, WatchOptions, WatchState, Watcher,
};
