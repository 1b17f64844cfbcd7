//! Path utilities for tinyq.
//!
//! # Base Directories
//! - [`get_tinyq_dir`] - `~/.tinyq/` (base directory for all tinyq data)
//! - [`get_data_dir`] - `~/.tinyq/data/` (one `.redb` store per application)
//!
//! # Configuration
//! - [`get_config_path`] - `~/.tinyq/tinyq.toml`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the tinyq base directory.
///
/// Resolution order:
/// 1. `TINYQ_HOME` environment variable (if set)
/// 2. `~/.tinyq/` (default)
pub fn get_tinyq_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("TINYQ_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".tinyq"))
}

/// Get the default store directory: `~/.tinyq/data/`
pub fn get_data_dir() -> Result<PathBuf> {
    Ok(get_tinyq_dir()?.join("data"))
}

/// Get the config path: `~/.tinyq/tinyq.toml`
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_tinyq_dir()?.join("tinyq.toml"))
}
