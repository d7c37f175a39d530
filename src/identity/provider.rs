use std::sync::Arc;

use tracing::info;

use super::principal::Role;
use super::session::{SessionManager, SessionToken};
use crate::error::{AccountError, SessionError};
use crate::storage::{AuthResult, CredentialStore};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated { token: SessionToken, role: Role, dev: bool },
    /// Any non-success result, passed through so the caller can word the message.
    Denied(AuthResult),
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginOutcome, LoginError>;
}

/// Password login against the local account table.
pub struct LocalAuthProvider {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionManager>,
}

impl LocalAuthProvider {
    pub fn new(store: Arc<CredentialStore>, sessions: Arc<SessionManager>) -> Self { Self { store, sessions } }

    /// First-run setup: create the initial root account, then sign it in.
    pub fn bootstrap(&self, name: &str, password: &str) -> Result<LoginOutcome, LoginError> {
        self.store.bootstrap_root(name, password)?;
        let token = self.sessions.create(name)?;
        info!("auth.bootstrap user={}", name);
        Ok(LoginOutcome::Authenticated { token, role: Role::Root, dev: false })
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginOutcome, LoginError> {
        let result = self.store.verify_credentials(&req.username, &req.password)?;
        let Some(role) = result.role() else { return Ok(LoginOutcome::Denied(result)) };
        let token = self.sessions.create(&req.username)?;
        Ok(LoginOutcome::Authenticated { token, role, dev: result == AuthResult::DevBypass })
    }
}
