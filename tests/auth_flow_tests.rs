//! Login, lockout and session integration tests against an on-disk account database.
//! Hash cost is turned down so Argon2 does not dominate the run time.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tempfile::tempdir;

use phantom_console::clock::ManualClock;
use phantom_console::identity::{
    AuthProvider, AuthorizationGate, CommandKind, LocalAuthProvider, LoginOutcome, LoginRequest, Role, SessionManager,
    SessionWatchdog,
};
use phantom_console::security::{HashCost, PasswordPolicy};
use phantom_console::storage::{AuthResult, CredentialStore, DevBypass, LockoutPolicy, StoreOptions};
use phantom_console::system_paths;

const ROOT_PW: &str = "R00t!Secret";
const PW: &str = "Str0ng!Pw";

struct Harness {
    _dir: tempfile::TempDir,
    clock: Arc<ManualClock>,
    store: Arc<CredentialStore>,
    sessions: Arc<SessionManager>,
    provider: LocalAuthProvider,
    gate: AuthorizationGate,
}

fn harness(max_attempts: u32, dev: Option<DevBypass>) -> Result<Harness> {
    let dir = tempdir()?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mut opts = StoreOptions::new(LockoutPolicy::new(max_attempts, Duration::from_secs(300)))
        .with_policy(PasswordPolicy::with_cost(HashCost { memory_kib: 256, iterations: 1 })?)
        .with_clock(clock.clone());
    if let Some(d) = dev { opts = opts.with_dev_bypass(d); }
    let store = Arc::new(CredentialStore::open(&system_paths::database_path(dir.path()), opts)?);
    let sessions = Arc::new(SessionManager::with_clock(Duration::from_secs(300), clock.clone()));
    let provider = LocalAuthProvider::new(store.clone(), sessions.clone());
    let gate = AuthorizationGate::new(store.clone(), sessions.clone());
    Ok(Harness { _dir: dir, clock, store, sessions, provider, gate })
}

fn token_of(outcome: LoginOutcome) -> String {
    match outcome {
        LoginOutcome::Authenticated { token, .. } => token,
        other => panic!("expected authentication, got {:?}", other),
    }
}

#[test]
fn bootstrap_then_login_and_gate() -> Result<()> {
    let h = harness(3, None)?;
    let boot = h.provider.bootstrap("root", ROOT_PW)?;
    let root_token = token_of(boot);
    assert!(h.gate.check_command_allowed(&root_token, CommandKind::UserCreate));
    h.store.create_account("bob", PW, Role::User)?;

    let bob = token_of(h.provider.login(&LoginRequest::new("bob", PW))?);
    // Single-session: root's token is superseded by bob's login.
    assert!(!h.sessions.validate(&root_token));
    assert!(h.gate.check_command_allowed(&bob, CommandKind::UserList));
    assert!(!h.gate.check_command_allowed(&bob, CommandKind::UserDelete));
    Ok(())
}

#[test]
fn alice_locks_out_and_recovers() -> Result<()> {
    let h = harness(3, None)?;
    h.store.bootstrap_root("root", ROOT_PW)?;
    h.store.create_account("alice", PW, Role::User)?;

    let bad = LoginRequest::new("alice", "Wrong!Pw1");
    assert_eq!(h.provider.login(&bad)?, LoginOutcome::Denied(AuthResult::Rejected { remaining_attempts: 2 }));
    assert_eq!(h.provider.login(&bad)?, LoginOutcome::Denied(AuthResult::Rejected { remaining_attempts: 1 }));
    assert_eq!(h.provider.login(&bad)?, LoginOutcome::Denied(AuthResult::JustLocked));
    assert_eq!(h.provider.login(&LoginRequest::new("alice", PW))?, LoginOutcome::Denied(AuthResult::Locked));
    assert!(!h.sessions.is_active());

    h.clock.advance(Duration::from_secs(301));
    let outcome = h.provider.login(&LoginRequest::new("alice", PW))?;
    assert!(matches!(outcome, LoginOutcome::Authenticated { role: Role::User, dev: false, .. }));
    Ok(())
}

#[test]
fn idle_session_is_denied_everywhere() -> Result<()> {
    let h = harness(3, None)?;
    let t = token_of(h.provider.bootstrap("root", ROOT_PW)?);
    h.clock.advance(Duration::from_secs(301));
    assert_eq!(h.sessions.remaining_time(), 0);
    assert!(!h.gate.require_role(&t, Role::User));
    assert!(!h.sessions.is_active());
    Ok(())
}

#[test]
fn watchdog_evicts_idle_session() -> Result<()> {
    let h = harness(3, None)?;
    h.provider.bootstrap("root", ROOT_PW)?;
    let (tx, rx) = mpsc::channel();
    let _dog = SessionWatchdog::spawn(h.sessions.clone(), Duration::from_millis(10), move |u| {
        let _ = tx.send(u.to_string());
    })?;
    h.clock.advance(Duration::from_secs(301));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, "root");
    assert!(!h.sessions.is_active());
    Ok(())
}

#[test]
fn dev_bypass_logs_in_as_root_without_account() -> Result<()> {
    let h = harness(3, Some(DevBypass::new("dev", "D3v!pass")))?;
    let outcome = h.provider.login(&LoginRequest::new("dev", "D3v!pass"))?;
    assert!(matches!(outcome, LoginOutcome::Authenticated { role: Role::Root, dev: true, .. }));
    let t = token_of(outcome);
    assert!(h.gate.require_role(&t, Role::Root));
    assert!(h.store.list_accounts()?.is_empty());
    // Still needs a real root password to promote anyone.
    h.store.bootstrap_root("root", ROOT_PW)?;
    h.store.create_account("bob", PW, Role::User)?;
    assert!(h.gate.promote(&t, "bob", "D3v!pass").is_err());
    assert!(h.gate.promote(&t, "bob", ROOT_PW)?);
    Ok(())
}

#[test]
fn concurrent_logins_keep_counters_consistent() -> Result<()> {
    let h = harness(50, None)?;
    h.store.create_account("carol", PW, Role::User)?;
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = h.store.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    let _ = store.verify_credentials("carol", "Wrong!Pw1");
                }
            })
        })
        .collect();
    for t in handles { t.join().expect("worker panicked"); }
    let acct = h.store.get_account("carol")?.expect("carol exists");
    assert_eq!(acct.login_attempts, 20);
    Ok(())
}
