//! Console configuration.
//!
//! Precedence (highest first):
//! 1. Environment variables (`PHANTOM_*`)
//! 2. `config.toml` (path from `PHANTOM_CONFIG`, else `<data_dir>/config.toml`)
//! 3. Built-in defaults
//!
//! A missing file is not an error; a file that fails to parse is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::identity::{DEFAULT_SESSION_TIMEOUT, DEFAULT_WATCHDOG_INTERVAL};
use crate::security::{HashCost, PasswordPolicy};
use crate::storage::{DevBypass, LockoutPolicy, StoreOptions};
use crate::system_paths;

pub const ENV_CONFIG: &str = "PHANTOM_CONFIG";
pub const ENV_DATA_DIR: &str = "PHANTOM_DATA_DIR";
pub const ENV_SESSION_TIMEOUT: &str = "PHANTOM_SESSION_TIMEOUT";
pub const ENV_DEV: &str = "PHANTOM_DEV";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    #[serde(rename = "Version")]
    pub version: String,
    pub security: SecurityConfig,
    pub session: SessionConfig,
    pub dev: DevConfig,
    pub console: ConsoleSection,
    pub paths: PathsConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            security: SecurityConfig::default(),
            session: SessionConfig::default(),
            dev: DevConfig::default(),
            console: ConsoleSection::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_login_attempts: u32,
    /// Seconds.
    pub lockout_duration: u64,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let cost = HashCost::default();
        Self { max_login_attempts: 3, lockout_duration: 300, hash_memory_kib: cost.memory_kib, hash_iterations: cost.iterations }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout in seconds.
    pub timeout: u64,
    pub watchdog_interval_ms: u64,
    /// Remaining seconds at or below which the prompt warns about expiry.
    pub warn_threshold: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT.as_secs(),
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL.as_millis() as u64,
            warn_threshold: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

impl Default for DevConfig {
    fn default() -> Self { Self { enabled: false, username: "dev".to_string(), password: String::new() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSection {
    pub debug: bool,
    pub history_limit: usize,
}

impl Default for ConsoleSection {
    fn default() -> Self { Self { debug: false, history_limit: 1000 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self { Self { data_dir: system_paths::default_data_dir() } }
}

impl ConsoleConfig {
    /// Load from the process environment and the config file it points at.
    pub fn load() -> Result<Self, ConfigError> { Self::load_with(|k| std::env::var(k).ok()) }

    /// Same as [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match env(ENV_CONFIG) {
            Some(p) => PathBuf::from(p),
            None => {
                let dir = env(ENV_DATA_DIR).map(PathBuf::from).unwrap_or_else(system_paths::default_data_dir);
                system_paths::config_path(&dir)
            }
        };
        let mut cfg = if path.exists() { Self::from_file(&path)? } else {
            debug!("config.load file not found path={}, using defaults", path.display());
            Self::default()
        };
        cfg.apply_env(&env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(content)?) }

    fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env(ENV_DATA_DIR) { self.paths.data_dir = PathBuf::from(dir); }
        if let Some(val) = env(ENV_SESSION_TIMEOUT) {
            self.session.timeout = val.trim().parse()
                .map_err(|_| ConfigError::Invalid(format!("{}: expected seconds, got '{}'", ENV_SESSION_TIMEOUT, val)))?;
        }
        if let Some(val) = env(ENV_DEV) {
            self.dev.enabled = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::Invalid(format!("{}: expected bool, got '{}'", ENV_DEV, val))),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.max_login_attempts == 0 {
            return Err(ConfigError::Invalid("security.max_login_attempts must be at least 1".into()));
        }
        if self.session.timeout == 0 {
            return Err(ConfigError::Invalid("session.timeout must be greater than zero".into()));
        }
        if self.session.watchdog_interval_ms == 0 {
            return Err(ConfigError::Invalid("session.watchdog_interval_ms must be greater than zero".into()));
        }
        if self.dev.enabled && (self.dev.username.trim().is_empty() || self.dev.password.is_empty()) {
            return Err(ConfigError::Invalid("dev mode needs both dev.username and dev.password".into()));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path { &self.paths.data_dir }

    pub fn lockout(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.security.max_login_attempts, Duration::from_secs(self.security.lockout_duration))
    }

    pub fn session_timeout(&self) -> Duration { Duration::from_secs(self.session.timeout) }

    pub fn watchdog_interval(&self) -> Duration { Duration::from_millis(self.session.watchdog_interval_ms) }

    pub fn dev_bypass(&self) -> Option<DevBypass> {
        self.dev.enabled.then(|| DevBypass::new(self.dev.username.clone(), self.dev.password.clone()))
    }

    pub fn store_options(&self) -> Result<StoreOptions, ConfigError> {
        let policy = PasswordPolicy::with_cost(HashCost {
            memory_kib: self.security.hash_memory_kib,
            iterations: self.security.hash_iterations,
        })
        .map_err(|e| ConfigError::Invalid(format!("security hash cost: {}", e)))?;
        let mut opts = StoreOptions::new(self.lockout()).with_policy(policy);
        if let Some(dev) = self.dev_bypass() { opts = opts.with_dev_bypass(dev); }
        Ok(opts)
    }
}
