//! Configuration file resolution and loading
//!
//! Config file lookup order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/driftwave/config.toml`)
//! 4. System-wide file (`/etc/driftwave/config.toml`, Linux only)
//!
//! No file at all is not an error: callers fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "driftwave";

/// Config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Find the config file to load, if any
///
/// An explicit path (CLI or environment) is returned even if it does not
/// exist, so that loading it reports a clear error instead of silently
/// falling back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    debug!("Loaded config file {}", path.display());
    Ok(toml::from_str(&content)?)
}

/// Resolve and load a config file, or return `T::default()` when none exists
pub fn load_or_default<T: DeserializeOwned + Default>(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Result<T> {
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => load_toml(&path),
        None => {
            debug!("No config file found, using defaults");
            Ok(T::default())
        }
    }
}
