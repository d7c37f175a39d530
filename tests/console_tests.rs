//! Drives the shell with scripted input and checks what the operator would see.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use phantom_console::cli::{Console, ConsoleOptions, InputError, Prompter, ScriptedPrompter};
use phantom_console::clock::ManualClock;
use phantom_console::identity::{Role, SessionManager};
use phantom_console::security::{HashCost, PasswordPolicy};
use phantom_console::storage::{CredentialStore, DevBypass, LockoutPolicy, StoreOptions};

const ROOT_PW: &str = "R00t!Secret";
const PW: &str = "Str0ng!Pw";

fn store(dev: Option<DevBypass>) -> Result<Arc<CredentialStore>> {
    let mut opts = StoreOptions::new(LockoutPolicy::new(3, Duration::from_secs(300)))
        .with_policy(PasswordPolicy::with_cost(HashCost { memory_kib: 256, iterations: 1 })?);
    if let Some(d) = dev { opts = opts.with_dev_bypass(d); }
    Ok(Arc::new(CredentialStore::open_in_memory(opts)?))
}

fn run(store: Arc<CredentialStore>, prompter: ScriptedPrompter) -> Result<(String, ScriptedPrompter)> {
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(300)));
    run_with(store, sessions, prompter, ConsoleOptions::default())
}

fn run_with(
    store: Arc<CredentialStore>,
    sessions: Arc<SessionManager>,
    prompter: ScriptedPrompter,
    opts: ConsoleOptions,
) -> Result<(String, ScriptedPrompter)> {
    let mut console = Console::new(store, sessions, prompter, Vec::new(), opts);
    console.run()?;
    let (prompter, out) = console.into_parts();
    Ok((String::from_utf8(out)?, prompter))
}

#[test]
fn first_run_creates_root_and_enters_shell() -> Result<()> {
    let st = store(None)?;
    let script = ScriptedPrompter::new(["root", "weak", "weak", "root", ROOT_PW, ROOT_PW, "info", "exit"]);
    let (out, p) = run(st.clone(), script)?;
    assert!(out.contains("First Time Setup"));
    assert!(out.contains("Password must be at least 8 characters long"));
    assert!(out.contains("Root account created successfully!"));
    assert!(out.contains("About Phantom Console"));
    assert!(out.contains("Goodbye!"));
    assert!(p.prompts().iter().any(|pr| pr == "root@phantom> "));
    assert_eq!(st.get_role("root")?, Some(Role::Root));
    // Passwords never reach history.
    assert_eq!(p.history(), &["info".to_string(), "exit".to_string()]);
    Ok(())
}

#[test]
fn failed_logins_report_vaguely_with_counter() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    let script = ScriptedPrompter::new([
        "root", "nope",
        "ghost", "nope",
        "root", "nope",
        "root", "nope",
        "root", ROOT_PW,
    ]);
    let (out, _) = run(st, script)?;
    assert!(out.contains("2 attempts remaining"));
    assert!(out.contains("Too many failed attempts. Account has been locked."));
    assert!(!out.contains("Welcome back"));
    assert!(!out.contains("not found"));
    assert_eq!(out.matches("Invalid username or password").count(), 5);
    Ok(())
}

#[test]
fn root_manages_accounts() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    let script = ScriptedPrompter::new([
        "root", ROOT_PW,
        "user create", "bob", PW, PW, "2",
        "user create", "amy", PW, PW, "1",
        "user list",
        "user update bob", "3", "1",
        "user delete amy", "y",
        "user delete root",
        "user delete",
        "user upgrade bob", "Wrong!Pw1",
        "exit",
    ]);
    let (out, _) = run(st.clone(), script)?;
    assert!(out.contains("User 'bob' created successfully"));
    assert!(out.contains("| amy  | admin |"));
    assert!(out.contains("User updated successfully"));
    assert!(out.contains("User deleted successfully"));
    assert!(out.contains("Cannot delete your own account"));
    assert!(out.contains("Usage: user delete <username>"));
    assert!(out.contains("Invalid root password"));
    assert_eq!(st.get_role("bob")?, Some(Role::Admin));
    assert_eq!(st.get_role("amy")?, None);
    Ok(())
}

#[test]
fn non_root_is_denied_admin_commands() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    st.create_account("bob", PW, Role::Admin)?;
    let script = ScriptedPrompter::new(["bob", PW, "user create", "user list", "user upgrade bob", "logout"]);
    let (out, p) = run(st.clone(), script)?;
    assert_eq!(out.matches("Access denied. Root privileges required.").count(), 2);
    assert!(out.contains("| root | root  |"));
    assert!(out.contains("Logged out successfully"));
    // Back at the login screen when input runs out.
    assert_eq!(p.prompts().last().map(String::as_str), Some("Username: "));
    assert_eq!(st.get_role("bob")?, Some(Role::Admin));
    Ok(())
}

#[test]
fn ctrl_c_cancels_without_exiting() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    let script = ScriptedPrompter::new(["root", ROOT_PW]).interrupt().line("user create").interrupt().line("exit");
    let (out, _) = run(st, script)?;
    assert!(out.contains("Use 'exit' to quit"));
    assert!(out.matches("Operation cancelled").count() >= 2);
    assert!(out.contains("Goodbye!"));
    Ok(())
}

#[test]
fn dev_mode_banner_and_prompt() -> Result<()> {
    let st = store(Some(DevBypass::new("dev", "D3v!pass")))?;
    st.bootstrap_root("root", ROOT_PW)?;
    let opts = ConsoleOptions { dev_credentials: Some(("dev".into(), "D3v!pass".into())), ..Default::default() };
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(300)));
    let (out, p) = run_with(st, sessions, ScriptedPrompter::new(["dev", "D3v!pass", "exit"]), opts)?;
    assert!(out.contains("DEVELOPMENT MODE IS ENABLED"));
    assert!(p.prompts().iter().any(|pr| pr == "[DEV] dev@phantom> "));
    Ok(())
}

#[test]
fn near_expiry_prints_warning() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sessions = Arc::new(SessionManager::with_clock(Duration::from_secs(300), clock));
    // Warn threshold above the timeout: every prompt carries the warning.
    let opts = ConsoleOptions { warn_threshold: 600, ..Default::default() };
    let (out, _) = run_with(st, sessions.clone(), ScriptedPrompter::new(["root", ROOT_PW, "help", "exit"]), opts)?;
    assert!(out.contains("Warning: Session will expire in 300 seconds"));
    assert!(!sessions.is_active());
    Ok(())
}

/// Replays a script, moving the clock forward when a given prompt is shown.
struct StallingPrompter {
    inner: ScriptedPrompter,
    clock: Arc<ManualClock>,
    stall_at: &'static str,
    stall_for: Duration,
}

impl StallingPrompter {
    fn stall(&self, prompt: &str) {
        if prompt == self.stall_at { self.clock.advance(self.stall_for); }
    }
}

impl Prompter for StallingPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError> {
        self.stall(prompt);
        self.inner.read_line(prompt)
    }

    fn read_password(&mut self, prompt: &str) -> Result<String, InputError> {
        self.stall(prompt);
        self.inner.read_password(prompt)
    }
}

fn run_stalling(st: Arc<CredentialStore>, stall_at: &'static str, lines: &[&str]) -> Result<String> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sessions = Arc::new(SessionManager::with_clock(Duration::from_secs(300), clock.clone()));
    let prompter = StallingPrompter {
        inner: ScriptedPrompter::new(lines.iter().copied()),
        clock,
        stall_at,
        stall_for: Duration::from_secs(900),
    };
    let mut console = Console::new(st, sessions, prompter, Vec::new(), ConsoleOptions::default());
    console.run()?;
    let (_, out) = console.into_parts();
    Ok(String::from_utf8(out)?)
}

#[test]
fn create_dialog_aborts_when_session_idles_out() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    let out = run_stalling(st.clone(), "Choice (1-2): ", &["root", ROOT_PW, "user create", "mallory", PW, PW, "1"])?;
    assert!(out.contains("Session expired. Please log in again."));
    assert!(!out.contains("created successfully"));
    assert_eq!(st.get_role("mallory")?, None);
    Ok(())
}

#[test]
fn delete_and_upgrade_abort_when_session_idles_out() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    st.create_account("bob", PW, Role::User)?;
    let out = run_stalling(st.clone(), "Are you sure? (y/N): ", &["root", ROOT_PW, "user delete bob", "y"])?;
    assert!(out.contains("Session expired. Please log in again."));
    assert!(!out.contains("User deleted successfully"));
    assert_eq!(st.get_role("bob")?, Some(Role::User));

    let out = run_stalling(st.clone(), "Root Password: ", &["root", ROOT_PW, "user upgrade bob", ROOT_PW])?;
    assert!(out.contains("Session expired. Please log in again."));
    assert!(!out.contains("upgraded to root"));
    assert_eq!(st.get_role("bob")?, Some(Role::User));
    Ok(())
}

#[test]
fn update_dialog_aborts_when_session_idles_out() -> Result<()> {
    let st = store(None)?;
    st.bootstrap_root("root", ROOT_PW)?;
    st.create_account("bob", PW, Role::User)?;
    let out = run_stalling(st.clone(), "New Username: ", &["root", ROOT_PW, "user update bob", "1", "robert"])?;
    assert!(out.contains("Session expired. Please log in again."));
    assert!(!out.contains("User updated successfully"));
    assert_eq!(st.get_role("bob")?, Some(Role::User));
    assert_eq!(st.get_role("robert")?, None);
    Ok(())
}

#[test]
fn update_of_missing_or_dev_user_reports_not_found() -> Result<()> {
    let st = store(Some(DevBypass::new("dev", "D3v!pass")))?;
    st.bootstrap_root("root", ROOT_PW)?;
    let script = ScriptedPrompter::new(["root", ROOT_PW, "user update ghost", "user update dev", "exit"]);
    let (out, _) = run(st, script)?;
    assert_eq!(out.matches("not found").count(), 2);
    assert!(out.contains("account 'ghost' not found"));
    assert!(out.contains("account 'dev' not found"));
    Ok(())
}
