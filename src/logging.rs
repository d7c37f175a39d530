//! Per-run log file setup for the console binary.
//! The shell owns the terminal, so log lines go to `<logs_dir>/<timestamp>.log`.
//! Only when that file cannot be created do they fall back to stderr.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Where this run's log lines end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

pub fn log_file_name(at: DateTime<Utc>) -> String { format!("{}.log", at.format("%Y-%m-%d_%H-%M-%S")) }

/// `RUST_LOG` wins; otherwise `debug` when the console debug flag is set, else `info`.
pub fn env_filter(debug: bool) -> EnvFilter {
    let fallback = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn open_log_file(logs_dir: &Path, at: DateTime<Utc>) -> std::io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(logs_dir)?;
    let path = logs_dir.join(log_file_name(at));
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Installs the global subscriber. A second call in the same process is a no-op.
pub fn init(logs_dir: &Path, debug: bool) -> LogTarget {
    let now = Utc::now();
    match open_log_file(logs_dir, now) {
        Ok((file, path)) => {
            let layer = fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file));
            let _ = tracing_subscriber::registry().with(env_filter(debug)).with(layer).try_init();
            LogTarget::File(path)
        }
        Err(e) => {
            let layer = fmt::layer().with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry().with(env_filter(debug)).with(layer).try_init();
            tracing::warn!("log file unavailable in {}: {}; logging to stderr", logs_dir.display(), e);
            LogTarget::Stderr
        }
    }
}
