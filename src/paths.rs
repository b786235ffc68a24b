//! Default locations for the configuration document and path settings.
//!
//! Pure resolution helpers: nothing here creates directories.

use std::path::{Path, PathBuf};

/// Application directory name under the platform config/cache/data roots.
pub const APP_DIR_NAME: &str = "termconf";

/// Environment variable that overrides the directory searched for `config.*`.
pub const CONFIG_DIR_ENV: &str = "TERMCONF_CONFIG_DIR";

/// Stem of the configuration document (`config.yaml`, `config.yml`, `config.toml`).
pub const CONFIG_FILE_STEM: &str = "config";

/// Directory searched for the configuration document when no explicit path is given.
///
/// `TERMCONF_CONFIG_DIR`, then the platform config dir, then `./.termconf`.
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR_NAME)))
}

/// Default value of `paths.cacheDir`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}/cache", APP_DIR_NAME)))
}

/// Default value of `paths.dataDir`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}/data", APP_DIR_NAME)))
}

/// Expand a leading `~` or `~/` to the home directory. Other paths pass through.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Render a path for display, abbreviating the home directory to `~`.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        if rest.as_os_str().is_empty() {
            return "~".to_string();
        }
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}
