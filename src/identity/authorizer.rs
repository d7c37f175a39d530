use std::sync::Arc;

use tracing::{debug, warn};

use super::principal::Role;
use super::session::SessionManager;
use crate::error::AccountResult;
use crate::storage::CredentialStore;

/// Console commands, grouped by the privilege they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Clear,
    Info,
    Logout,
    Exit,
    UserList,
    UserCreate,
    UserDelete,
    UserUpdate,
    UserUpgrade,
}

impl CommandKind {
    pub fn required_role(&self) -> Role {
        match self {
            CommandKind::UserCreate | CommandKind::UserDelete | CommandKind::UserUpdate | CommandKind::UserUpgrade => Role::Root,
            _ => Role::User,
        }
    }
}

/// Role checks for command dispatch, resolved against the live session.
pub struct AuthorizationGate {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionManager>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<CredentialStore>, sessions: Arc<SessionManager>) -> Self { Self { store, sessions } }

    /// Role of the session owner, if `token` is the live session.
    pub fn session_role(&self, token: &str) -> Option<Role> {
        if !self.sessions.validate(token) { return None; }
        let user = self.sessions.username()?;
        match self.store.get_role(&user) {
            Ok(role) => role,
            Err(e) => {
                warn!("authz.role lookup failed user={} code={}", user, e.code_str());
                None
            }
        }
    }

    pub fn require_role(&self, token: &str, required: Role) -> bool {
        let allowed = self.session_role(token).map(|r| r.satisfies(required)).unwrap_or(false);
        debug!("authz.require required={} allowed={}", required, allowed);
        allowed
    }

    pub fn check_command_allowed(&self, token: &str, cmd: CommandKind) -> bool {
        self.require_role(token, cmd.required_role())
    }

    /// Escalates `target` to root. Needs a root session plus the root password
    /// entered again; the token on its own is not enough.
    pub fn promote(&self, token: &str, target: &str, root_password: &str) -> AccountResult<bool> {
        if !self.require_role(token, Role::Root) {
            warn!("authz.promote denied target={}", target);
            return Ok(false);
        }
        self.store.promote_to_root(target, root_password)?;
        Ok(true)
    }
}
