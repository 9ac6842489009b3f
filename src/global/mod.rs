//! Filesystem locations. `GUILDSCRIBE_CONFIG_DIR` and `GUILDSCRIBE_DATA_DIR`
//! take precedence over the platform directories.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "guildscribe";
pub const CONFIG_DIR_ENV: &str = "GUILDSCRIBE_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "GUILDSCRIBE_DATA_DIR";

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = env_dir(CONFIG_DIR_ENV) {
        return Ok(dir);
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = env_dir(DATA_DIR_ENV) {
        return Ok(dir);
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share").join(APP_DIR)))
        .ok_or_else(|| anyhow!("Unable to determine data directory"))
}

/// Committed meeting records and their audio.
pub fn recordings_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("recordings"))
}

/// SQLite database holding portfolios and tasks.
pub fn db_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("guildscribe.db"))
}
