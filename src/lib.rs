pub mod clock;
pub mod config;
pub mod error;
pub mod security;
pub mod storage;
pub mod identity;
pub mod system_paths;
pub mod logging;
pub mod cli;

pub use config::ConsoleConfig;
pub use error::{AccountError, PolicyViolation};
pub use identity::{AuthorizationGate, Role, SessionManager};
pub use security::PasswordPolicy;
pub use storage::{AuthResult, CredentialStore};
