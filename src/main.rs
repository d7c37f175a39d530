//!
//! phantom console binary
//! ----------------------
//! Loads `config.toml`, opens the account database under the data directory,
//! starts the idle-session watchdog and hands the terminal to the shell.

use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::ExternalPrinter;
use tracing::info;

use phantom_console::cli::{Console, ConsoleOptions, RustylinePrompter};
use phantom_console::identity::{SessionManager, SessionWatchdog};
use phantom_console::logging::{self, LogTarget};
use phantom_console::storage::CredentialStore;
use phantom_console::{system_paths, ConsoleConfig};

fn main() -> Result<()> {
    let cfg = ConsoleConfig::load().context("loading configuration")?;
    let data_dir = cfg.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let target = logging::init(&system_paths::logs_dir(&data_dir), cfg.console.debug);
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        "Phantom Console starting: version={}, RUST_LOG='{}', data_dir='{}', session_timeout_secs={}, dev={}",
        cfg.version, rust_log, data_dir.display(), cfg.session.timeout, cfg.dev.enabled
    );
    if let LogTarget::File(path) = &target { info!("logging to {}", path.display()); }

    let db_path = system_paths::database_path(&data_dir);
    let store = Arc::new(
        CredentialStore::open(&db_path, cfg.store_options()?)
            .with_context(|| format!("opening account database {}", db_path.display()))?,
    );
    let sessions = Arc::new(SessionManager::new(cfg.session_timeout()));

    let mut prompter = RustylinePrompter::new(Some(system_paths::history_file(&data_dir)), cfg.console.history_limit)
        .context("initializing line editor")?;
    let mut printer = prompter.external_printer();
    let _watchdog = SessionWatchdog::spawn(sessions.clone(), cfg.watchdog_interval(), move |user| {
        let msg = format!("\nSession for '{}' timed out due to inactivity", user);
        match printer.as_mut() {
            Some(p) => { let _ = p.print(msg); }
            None => eprintln!("{}", msg),
        }
    })
    .context("starting session watchdog")?;

    let opts = ConsoleOptions {
        version: cfg.version.clone(),
        warn_threshold: cfg.session.warn_threshold,
        debug: cfg.console.debug,
        dev_credentials: cfg.dev_bypass().map(|d| (d.username, d.password)),
    };
    let mut console = Console::new(store, sessions, prompter, std::io::stdout(), opts);
    console.run().context("console terminated")?;
    Ok(())
}
