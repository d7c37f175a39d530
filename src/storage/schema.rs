//! Account table layout and row conversions.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Row};

use crate::error::AccountError;
use crate::identity::Role;

pub(crate) const ACCOUNTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    name TEXT PRIMARY KEY NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('root', 'admin', 'user')),
    login_attempts INTEGER NOT NULL DEFAULT 0 CHECK (login_attempts >= 0),
    last_attempt INTEGER
);
CREATE INDEX IF NOT EXISTS idx_accounts_role ON accounts(role);";

/// Idempotent; safe to run on every open.
pub(crate) fn install(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.execute_batch(ACCOUNTS_DDL)
}

pub(crate) const SELECT_ACCOUNT: &str =
    "SELECT name, password_hash, role, login_attempts, last_attempt FROM accounts WHERE name = ?1";

/// Listing order: root, admin, user, then name.
pub(crate) const LIST_ACCOUNTS: &str = "
SELECT name, role FROM accounts
ORDER BY CASE role WHEN 'root' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END, name ASC";

#[derive(Debug, Clone)]
pub(crate) struct AccountRow {
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub login_attempts: u32,
    pub last_attempt: Option<i64>,
}

impl AccountRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            password_hash: row.get(1)?,
            role: row.get(2)?,
            login_attempts: row.get(3)?,
            last_attempt: row.get(4)?,
        })
    }
}

/// Account state without the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub role: Role,
    pub login_attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Self {
            name: r.name,
            role: r.role,
            login_attempts: r.login_attempts,
            last_attempt: r.last_attempt.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> { Ok(ToSqlOutput::from(self.as_str())) }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse::<Role>().map_err(|e: AccountError| FromSqlError::Other(Box::new(e)))
    }
}
