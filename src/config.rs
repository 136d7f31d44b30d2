//! Configuration file loading.
//!
//! A small JSON document at `~/.config/uniquefile.json` names the
//! database the repository connects to:
//!
//! ```json
//! {"db": {"driverName": "sqlite3", "dataSourceName": "uniquefile.db", "dialect": "sqlite3"}}
//! ```

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
}

/// The `db` section of the configuration file. Field names keep the
/// document's camelCase spelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(rename = "driverName")]
    pub driver_name: String,
    #[serde(rename = "dataSourceName")]
    pub data_source_name: String,
    pub dialect: String,
}

impl Config {
    /// `$HOME/.config/uniquefile.json`.
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| AppError::config("cannot determine the home directory"))?;
        Ok(PathBuf::from(home).join(".config").join("uniquefile.json"))
    }

    /// Load and parse the configuration document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(format!(
                "failed to read configuration file {}: {err}",
                path.display()
            ))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|err| {
            AppError::config(format!(
                "failed to parse configuration file {}: {err}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}
