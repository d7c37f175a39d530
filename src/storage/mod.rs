//!
//! phantom account store
//! ----------------------
//! SQLite-backed table of console accounts plus the lockout-aware credential
//! check. Each account is `Unlocked` or `Locked`:
//!
//! - `Unlocked -> Locked` when a failed attempt brings `login_attempts` up to
//!   the configured maximum.
//! - `Locked -> Unlocked` lazily, on the first lock check after the lockout
//!   window (measured from the last failed attempt) has elapsed.
//!
//! A locked account never has its password compared, so a correct password
//! presented during the window is refused without touching the counters.
//!
//! Every public operation runs inside one SQLite transaction; an error drops
//! the transaction, which rolls it back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{AccountError, AccountResult};
use crate::identity::{AccountSummary, Role};
use crate::security::{constant_time_eq, PasswordPolicy};

pub mod schema;

pub use schema::Account;
use schema::AccountRow;

const MAX_NAME_LEN: usize = 64;

/// Brute-force thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account. Always at least 1.
    pub max_attempts: u32,
    /// How long a locked account stays locked after its last failed attempt.
    pub lockout_duration: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), lockout_duration }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self { Self::new(3, Duration::from_secs(300)) }
}

/// Fixed credential pair that authenticates as root without a stored account.
#[derive(Clone)]
pub struct DevBypass {
    pub username: String,
    pub password: String,
}

impl DevBypass {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    fn matches(&self, name: &str, password: &str) -> bool {
        let name_ok = constant_time_eq(self.username.as_bytes(), name.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        name_ok & pass_ok
    }
}

impl std::fmt::Debug for DevBypass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevBypass").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    /// The configured dev credentials matched; always root.
    DevBypass,
    Success(Role),
    /// Account is inside its lockout window; the password was not compared.
    Locked,
    NotFound,
    Rejected { remaining_attempts: u32 },
    /// This failure reached the attempt limit and locked the account.
    JustLocked,
}

impl AuthResult {
    /// Role granted by a successful check.
    pub fn role(&self) -> Option<Role> {
        match self {
            AuthResult::DevBypass => Some(Role::Root),
            AuthResult::Success(role) => Some(*role),
            _ => None,
        }
    }
}

/// Fields to change in `update_account`; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub new_name: Option<String>,
    pub new_password: Option<String>,
    pub new_role: Option<Role>,
}

impl AccountUpdate {
    pub fn rename(name: impl Into<String>) -> Self { Self { new_name: Some(name.into()), ..Default::default() } }
    pub fn password(password: impl Into<String>) -> Self { Self { new_password: Some(password.into()), ..Default::default() } }
    pub fn role(role: Role) -> Self { Self { new_role: Some(role), ..Default::default() } }

    fn is_empty(&self) -> bool { self.new_name.is_none() && self.new_password.is_none() && self.new_role.is_none() }
}

/// Construction parameters for [`CredentialStore`].
#[derive(Clone)]
pub struct StoreOptions {
    pub lockout: LockoutPolicy,
    pub dev_bypass: Option<DevBypass>,
    pub policy: PasswordPolicy,
    pub clock: Arc<dyn Clock>,
}

impl StoreOptions {
    pub fn new(lockout: LockoutPolicy) -> Self {
        Self { lockout, dev_bypass: None, policy: PasswordPolicy::default(), clock: Arc::new(SystemClock) }
    }

    pub fn with_dev_bypass(mut self, dev: DevBypass) -> Self { self.dev_bypass = Some(dev); self }
    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self { self.policy = policy; self }
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self { self.clock = clock; self }
}

impl Default for StoreOptions {
    fn default() -> Self { Self::new(LockoutPolicy::default()) }
}

pub struct CredentialStore {
    conn: Mutex<Connection>,
    lockout: LockoutPolicy,
    dev_bypass: Option<DevBypass>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    /// Open (or create) the account database at `db_path`.
    pub fn open(db_path: &Path, opts: StoreOptions) -> AccountResult<Self> {
        if let Some(dir) = db_path.parent() { std::fs::create_dir_all(dir).ok(); }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, opts)
    }

    pub fn open_in_memory(opts: StoreOptions) -> AccountResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, opts)
    }

    fn with_connection(conn: Connection, opts: StoreOptions) -> AccountResult<Self> {
        schema::install(&conn)?;
        debug!("store.open max_attempts={} lockout_secs={} dev_bypass={}",
            opts.lockout.max_attempts, opts.lockout.lockout_duration.as_secs(), opts.dev_bypass.is_some());
        Ok(Self {
            conn: Mutex::new(conn),
            lockout: opts.lockout,
            dev_bypass: opts.dev_bypass,
            policy: opts.policy,
            clock: opts.clock,
        })
    }

    pub fn password_policy(&self) -> &PasswordPolicy { &self.policy }

    /// True when `name` is the enabled dev-bypass username.
    pub fn is_dev_user(&self, name: &str) -> bool {
        self.dev_bypass.as_ref().map(|d| d.username == name).unwrap_or(false)
    }

    // ── Account management ──────────────────────────────────────────

    pub fn create_account(&self, name: &str, password: &str, role: Role) -> AccountResult<()> {
        self.check_new_name(name)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if fetch(&tx, name)?.is_some() {
            warn!("account.create duplicate name={}", name);
            return Err(AccountError::DuplicateAccount(name.to_string()));
        }
        self.policy.validate_strength(password)?;
        let hash = self.policy.hash(password)?;
        tx.execute(
            "INSERT INTO accounts (name, password_hash, role, login_attempts, last_attempt) VALUES (?1, ?2, ?3, 0, NULL)",
            params![name, hash, role],
        )?;
        tx.commit()?;
        info!("account.create name={} role={}", name, role);
        Ok(())
    }

    /// First-run path: creates the initial root account. Refused once any root exists.
    pub fn bootstrap_root(&self, name: &str, password: &str) -> AccountResult<()> {
        self.check_new_name(name)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if count_roots(&tx)? > 0 { return Err(AccountError::AlreadyInitialized); }
        if fetch(&tx, name)?.is_some() { return Err(AccountError::DuplicateAccount(name.to_string())); }
        self.policy.validate_strength(password)?;
        let hash = self.policy.hash(password)?;
        tx.execute(
            "INSERT INTO accounts (name, password_hash, role, login_attempts, last_attempt) VALUES (?1, ?2, ?3, 0, NULL)",
            params![name, hash, Role::Root],
        )?;
        tx.commit()?;
        info!("account.bootstrap root={}", name);
        Ok(())
    }

    pub fn update_account(&self, name: &str, update: &AccountUpdate) -> AccountResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(current) = fetch(&tx, name)? else { return Err(AccountError::NotFound(name.to_string())) };
        if current.role == Role::Root && (update.new_name.is_some() || update.new_role.is_some()) {
            warn!("account.update refused root name/role change name={}", name);
            return Err(AccountError::RootImmutable);
        }
        let new_hash = match update.new_password.as_deref() {
            Some(pw) => {
                self.policy.validate_strength(pw)?;
                Some(self.policy.hash(pw)?)
            }
            None => None,
        };
        if let Some(role) = update.new_role {
            if !role.is_assignable() { return Err(AccountError::InvalidRole(role.to_string())); }
        }
        if let Some(new_name) = update.new_name.as_deref() {
            if new_name != name {
                self.check_new_name(new_name)?;
                if fetch(&tx, new_name)?.is_some() {
                    return Err(AccountError::DuplicateAccount(new_name.to_string()));
                }
            }
        }
        if update.is_empty() { return Err(AccountError::NothingToUpdate); }

        tx.execute(
            "UPDATE accounts SET
                name = COALESCE(?1, name),
                password_hash = COALESCE(?2, password_hash),
                role = COALESCE(?3, role)
             WHERE name = ?4",
            params![update.new_name.as_deref(), new_hash, update.new_role, name],
        )?;
        tx.commit()?;
        info!("account.update name={} renamed_to={:?} password_changed={} role={:?}",
            name, update.new_name, update.new_password.is_some(), update.new_role.map(|r| r.as_str()));
        Ok(())
    }

    /// Removes a non-root account. Refusing self-deletion is the caller's job.
    pub fn delete_account(&self, name: &str) -> AccountResult<()> {
        if self.is_dev_user(name) { return Err(AccountError::RootProtected); }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(current) = fetch(&tx, name)? else { return Err(AccountError::NotFound(name.to_string())) };
        if current.role == Role::Root {
            warn!("account.delete refused root name={}", name);
            return Err(AccountError::RootProtected);
        }
        tx.execute("DELETE FROM accounts WHERE name = ?1", params![name])?;
        tx.commit()?;
        info!("account.delete name={}", name);
        Ok(())
    }

    pub fn list_accounts(&self) -> AccountResult<Vec<AccountSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(schema::LIST_ACCOUNTS)?;
        let accounts = stmt
            .query_map([], |row| Ok(AccountSummary { name: row.get(0)?, role: row.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Escalates `name` to root after `root_password` verifies against a stored
    /// root account. A root session alone is not enough.
    pub fn promote_to_root(&self, name: &str, root_password: &str) -> AccountResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(current) = fetch(&tx, name)? else { return Err(AccountError::NotFound(name.to_string())) };
        if current.role == Role::Root { return Err(AccountError::AlreadyRoot(name.to_string())); }
        if !self.matches_any_root(&tx, root_password)? {
            warn!("account.promote step-up failed target={}", name);
            return Err(AccountError::StepUpFailed);
        }
        tx.execute("UPDATE accounts SET role = ?1 WHERE name = ?2", params![Role::Root, name])?;
        tx.commit()?;
        info!("account.promote name={} role=root", name);
        Ok(())
    }

    pub fn verify_root_password(&self, password: &str) -> AccountResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        self.matches_any_root(&tx, password)
    }

    pub fn get_role(&self, name: &str) -> AccountResult<Option<Role>> {
        if self.is_dev_user(name) { return Ok(Some(Role::Root)); }
        let conn = self.conn.lock();
        let role = conn
            .query_row("SELECT role FROM accounts WHERE name = ?1", params![name], |row| row.get::<_, Role>(0))
            .optional()?;
        if role.is_none() { debug!("account.role none for name={}", name); }
        Ok(role)
    }

    pub fn get_account(&self, name: &str) -> AccountResult<Option<Account>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Ok(fetch(&tx, name)?.map(Account::from))
    }

    pub fn has_root_account(&self) -> AccountResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Ok(count_roots(&tx)? > 0)
    }

    pub fn account_count(&self) -> AccountResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Lock check with lazy reset: an elapsed lockout window clears the counters.
    pub fn is_locked(&self, name: &str) -> AccountResult<bool> {
        let now = self.clock.now().timestamp();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let locked = self.lock_state(&tx, name, now)?;
        tx.commit()?;
        Ok(locked)
    }

    pub fn verify_credentials(&self, name: &str, password: &str) -> AccountResult<AuthResult> {
        if let Some(dev) = &self.dev_bypass {
            if dev.matches(name, password) {
                info!("auth.login dev bypass user={}", name);
                return Ok(AuthResult::DevBypass);
            }
        }
        debug!("auth.verify user={}", name);
        let now = self.clock.now().timestamp();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if self.lock_state(&tx, name, now)? {
            tx.commit()?;
            warn!("auth.login refused, account locked user={}", name);
            return Ok(AuthResult::Locked);
        }

        let Some(account) = fetch(&tx, name)? else {
            tx.commit()?;
            drop(conn);
            // Burn a comparable amount of work so unknown names are not faster to reject.
            if let Err(e) = self.policy.hash(password) {
                debug!("auth.login dummy hash failed code={} err={}", e.code_str(), e);
            }
            warn!("auth.login unknown user={}", name);
            return Ok(AuthResult::NotFound);
        };

        if self.policy.verify(password, &account.password_hash) {
            tx.execute(
                "UPDATE accounts SET login_attempts = 0, last_attempt = NULL WHERE name = ?1",
                params![name],
            )?;
            tx.commit()?;
            info!("auth.login success user={} role={}", name, account.role);
            return Ok(AuthResult::Success(account.role));
        }

        let attempts = account.login_attempts.saturating_add(1);
        tx.execute(
            "UPDATE accounts SET login_attempts = ?1, last_attempt = ?2 WHERE name = ?3",
            params![attempts, now, name],
        )?;
        tx.commit()?;
        if attempts >= self.lockout.max_attempts {
            warn!("auth.login account locked after {} failed attempts user={}", attempts, name);
            Ok(AuthResult::JustLocked)
        } else {
            let remaining = self.lockout.max_attempts - attempts;
            warn!("auth.login rejected user={} remaining_attempts={}", name, remaining);
            Ok(AuthResult::Rejected { remaining_attempts: remaining })
        }
    }

    fn lock_state(&self, tx: &Transaction<'_>, name: &str, now: i64) -> AccountResult<bool> {
        let row: Option<(u32, Option<i64>)> = tx
            .query_row(
                "SELECT login_attempts, last_attempt FROM accounts WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((attempts, last_attempt)) = row else { return Ok(false) };
        if attempts < self.lockout.max_attempts { return Ok(false); }
        let Some(last_attempt) = last_attempt else { return Ok(false) };
        let window = i64::try_from(self.lockout.lockout_duration.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(last_attempt) <= window { return Ok(true); }
        tx.execute(
            "UPDATE accounts SET login_attempts = 0, last_attempt = NULL WHERE name = ?1",
            params![name],
        )?;
        info!("auth.lockout expired user={}", name);
        Ok(false)
    }

    fn matches_any_root(&self, tx: &Transaction<'_>, password: &str) -> AccountResult<bool> {
        let mut stmt = tx.prepare("SELECT password_hash FROM accounts WHERE role = 'root' ORDER BY name")?;
        let hashes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hashes.iter().any(|h| self.policy.verify(password, h)))
    }

    fn check_new_name(&self, name: &str) -> AccountResult<()> {
        if name.trim().is_empty() { return Err(AccountError::InvalidName("name cannot be empty".into())); }
        if name.trim() != name { return Err(AccountError::InvalidName("name cannot start or end with whitespace".into())); }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AccountError::InvalidName(format!("name too long (max {} characters)", MAX_NAME_LEN)));
        }
        if self.is_dev_user(name) { return Err(AccountError::DuplicateAccount(name.to_string())); }
        Ok(())
    }
}

fn fetch(tx: &Transaction<'_>, name: &str) -> AccountResult<Option<AccountRow>> {
    Ok(tx.query_row(schema::SELECT_ACCOUNT, params![name], AccountRow::from_row).optional()?)
}

fn count_roots(tx: &Transaction<'_>) -> AccountResult<i64> {
    Ok(tx.query_row("SELECT COUNT(*) FROM accounts WHERE role = 'root'", [], |row| row.get(0))?)
}
