use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::AccountError;

/// Account role. Ordered by privilege: `Root` > `Admin` > `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Root => 2,
            Role::Admin => 1,
            Role::User => 0,
        }
    }

    /// True when this role grants at least the privileges of `required`.
    pub fn satisfies(&self, required: Role) -> bool { self.rank() >= required.rank() }

    /// Roles an existing account may be moved to through an ordinary update.
    pub fn is_assignable(&self) -> bool { matches!(self, Role::Admin | Role::User) }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "root" => Ok(Role::Root),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(AccountError::InvalidRole(other.to_string())),
        }
    }
}

/// Name and role of a stored account, as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub name: String,
    pub role: Role,
}
