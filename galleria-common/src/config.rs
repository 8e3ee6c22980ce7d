//! TOML configuration loading and path resolution
//!
//! Bootstrap configuration only. Runtime tunables (delay windows, scoring
//! thresholds, retention days) live in the database settings table and are
//! re-read at the start of every collection run.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from TOML
///
/// Resolution order for each credential field: database settings table,
/// then `GALLERIA_*` environment variable, then this file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Address the HTTP API binds to (default 127.0.0.1:5780)
    pub listen_addr: Option<String>,
    /// Path to the SQLite database file
    pub database_path: Option<String>,
    /// Upstream API base URL override (tests point this at a stub)
    pub upstream_base_url: Option<String>,
    /// Upstream OAuth token endpoint override
    pub upstream_auth_url: Option<String>,
    /// Long-lived refresh token for the upstream API
    pub refresh_token: Option<String>,
}

/// Resolve the configuration file path:
/// 1. `GALLERIA_CONFIG` environment variable
/// 2. `~/.config/galleria/galleria.toml`
/// 3. `/etc/galleria/galleria.toml`
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("GALLERIA_CONFIG") {
        return Some(PathBuf::from(path));
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("galleria").join("galleria.toml"))
    {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/galleria/galleria.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load TOML configuration from a path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

/// Load configuration from the resolved path, or defaults if none exists
pub fn load_or_default() -> Result<TomlConfig> {
    match resolve_config_path() {
        Some(path) => load_toml_config(&path),
        None => Ok(TomlConfig::default()),
    }
}

/// Write TOML configuration atomically (write-to-temp, rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Resolve the database path: TOML value, `GALLERIA_DATABASE` env var,
/// or `galleria.db` in the platform data directory.
pub fn resolve_database_path(config: &TomlConfig) -> PathBuf {
    if let Ok(path) = std::env::var("GALLERIA_DATABASE") {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.database_path {
        return PathBuf::from(path);
    }

    dirs::data_local_dir()
        .map(|d| d.join("galleria").join("galleria.db"))
        .unwrap_or_else(|| PathBuf::from("galleria.db"))
}
