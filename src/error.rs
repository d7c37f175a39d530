//! Error model shared by the account store, the session manager and the console.
//! Every variant carries a stable `code_str()` so the console and the log lines can
//! refer to failures without depending on the human-readable message.

use thiserror::Error;

/// First password-strength rule a candidate password breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Password must be at least 8 characters long")]
    TooShort,
    #[error("Password must contain at least one uppercase letter")]
    NoUppercase,
    #[error("Password must contain at least one lowercase letter")]
    NoLowercase,
    #[error("Password must contain at least one number")]
    NoDigit,
    #[error("Password must contain at least one special character")]
    NoSpecialChar,
}

impl PolicyViolation {
    pub fn code_str(&self) -> &'static str {
        match self {
            PolicyViolation::TooShort => "too_short",
            PolicyViolation::NoUppercase => "no_uppercase",
            PolicyViolation::NoLowercase => "no_lowercase",
            PolicyViolation::NoDigit => "no_digit",
            PolicyViolation::NoSpecialChar => "no_special_char",
        }
    }
}

/// Request-level failures of the account store.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account '{0}' already exists")]
    DuplicateAccount(String),
    #[error("account '{0}' not found")]
    NotFound(String),
    #[error("invalid account name: {0}")]
    InvalidName(String),
    #[error("cannot modify a root account's name or role")]
    RootImmutable,
    #[error("cannot delete root accounts")]
    RootProtected,
    #[error("invalid role '{0}': must be 'admin' or 'user'")]
    InvalidRole(String),
    #[error("account '{0}' is already root")]
    AlreadyRoot(String),
    #[error("root password verification failed")]
    StepUpFailed,
    #[error("no updates specified")]
    NothingToUpdate,
    #[error("a root account already exists")]
    AlreadyInitialized,
    #[error(transparent)]
    WeakPassword(#[from] PolicyViolation),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl AccountError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AccountError::DuplicateAccount(_) => "duplicate_account",
            AccountError::NotFound(_) => "not_found",
            AccountError::InvalidName(_) => "invalid_name",
            AccountError::RootImmutable => "root_immutable",
            AccountError::RootProtected => "root_protected",
            AccountError::InvalidRole(_) => "invalid_role",
            AccountError::AlreadyRoot(_) => "already_root",
            AccountError::StepUpFailed => "step_up_failed",
            AccountError::NothingToUpdate => "nothing_to_update",
            AccountError::AlreadyInitialized => "already_initialized",
            AccountError::WeakPassword(_) => "weak_password",
            AccountError::Storage(_) => "storage",
            AccountError::Hashing(_) => "hashing",
        }
    }

    /// Storage and hashing failures abort the operation; everything else is the
    /// operator's request being refused.
    pub fn is_internal(&self) -> bool {
        matches!(self, AccountError::Storage(_) | AccountError::Hashing(_))
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("random source unavailable: {0}")]
    Entropy(String),
}

impl SessionError {
    pub fn code_str(&self) -> &'static str {
        match self {
            SessionError::Entropy(_) => "entropy",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type AccountResult<T> = Result<T, AccountError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
