use std::path::{Path, PathBuf};

/// Centralized helpers for the files kept under the console's data directory.
/// This keeps locations consistent across the binary, config and tests.
pub const DEFAULT_DATA_DIR: &str = "phantom";

pub const CONFIG_FILE: &str = "config.toml";

#[inline]
pub fn default_data_dir() -> PathBuf { PathBuf::from(DEFAULT_DATA_DIR) }

#[inline]
pub fn database_path(data_dir: &Path) -> PathBuf { data_dir.join("database.db") }

#[inline]
pub fn config_path(data_dir: &Path) -> PathBuf { data_dir.join(CONFIG_FILE) }

// ---- Per-run artifacts ----
#[inline]
pub fn logs_dir(data_dir: &Path) -> PathBuf { data_dir.join("logs") }

#[inline]
pub fn history_file(data_dir: &Path) -> PathBuf { data_dir.join(".phantom_history") }
