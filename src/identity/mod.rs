//! Accounts' roles, the single console session and the checks built on them.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod authorizer;
mod watchdog;

pub use principal::{AccountSummary, Role};
pub use session::{SessionManager, SessionToken, DEFAULT_SESSION_TIMEOUT};
pub use provider::{AuthProvider, LocalAuthProvider, LoginError, LoginOutcome, LoginRequest};
pub use authorizer::{AuthorizationGate, CommandKind};
pub use watchdog::{SessionWatchdog, DEFAULT_WATCHDOG_INTERVAL};
