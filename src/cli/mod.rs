//! The interactive shell: first-run setup, login, and command dispatch over a
//! [`Prompter`]. Everything the operator sees goes through one writer so the
//! shell can be driven from tests.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::AccountError;
use crate::identity::{
    AuthProvider, AuthorizationGate, CommandKind, LocalAuthProvider, LoginError, LoginOutcome, LoginRequest, Role,
    SessionManager, SessionToken,
};
use crate::storage::{AccountUpdate, AuthResult, CredentialStore};

pub mod input;
pub mod outputformatter;

pub use input::{InputError, Prompter, RustylinePrompter, ScriptedPrompter};

/// Display settings for the shell.
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub version: String,
    /// Remaining session seconds at or below which a warning is printed.
    pub warn_threshold: u64,
    pub debug: bool,
    /// Dev credentials to advertise in the banner, if dev mode is on.
    pub dev_credentials: Option<(String, String)>,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self { version: env!("CARGO_PKG_VERSION").to_string(), warn_threshold: 60, debug: false, dev_credentials: None }
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Info,
    Logout,
    Exit,
    User(UserCommand),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Menu,
    Create,
    Delete(Option<String>),
    List,
    Update(Option<String>),
    Upgrade(Option<String>),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let mut parts = line.split_whitespace();
        let head = parts.next()?.to_ascii_lowercase();
        let cmd = match head.as_str() {
            "help" => Command::Help,
            "clear" | "cls" => Command::Clear,
            "info" => Command::Info,
            "logout" => Command::Logout,
            "exit" | "quit" => Command::Exit,
            "user" => {
                let sub = parts.next().map(|s| s.to_ascii_lowercase());
                let arg = parts.next().map(str::to_string);
                Command::User(match sub.as_deref() {
                    None => UserCommand::Menu,
                    Some("create") => UserCommand::Create,
                    Some("delete") => UserCommand::Delete(arg),
                    Some("list") => UserCommand::List,
                    Some("update") => UserCommand::Update(arg),
                    Some("upgrade") => UserCommand::Upgrade(arg),
                    Some(other) => UserCommand::Unknown(other.to_string()),
                })
            }
            _ => Command::Unknown(head),
        };
        Some(cmd)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Help | Command::Unknown(_) => CommandKind::Help,
            Command::Clear => CommandKind::Clear,
            Command::Info => CommandKind::Info,
            Command::Logout => CommandKind::Logout,
            Command::Exit => CommandKind::Exit,
            Command::User(u) => match u {
                UserCommand::Menu | UserCommand::List | UserCommand::Unknown(_) => CommandKind::UserList,
                UserCommand::Create => CommandKind::UserCreate,
                UserCommand::Delete(_) => CommandKind::UserDelete,
                UserCommand::Update(_) => CommandKind::UserUpdate,
                UserCommand::Upgrade(_) => CommandKind::UserUpgrade,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct CurrentUser {
    name: String,
    token: SessionToken,
    dev: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Console<P: Prompter, W: Write> {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionManager>,
    provider: LocalAuthProvider,
    gate: AuthorizationGate,
    prompter: P,
    out: W,
    opts: ConsoleOptions,
    current: Option<CurrentUser>,
}

fn input_to_io(e: InputError) -> io::Error {
    error!("console.input error code={} err={}", e.code_str(), e);
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

impl<P: Prompter, W: Write> Console<P, W> {
    pub fn new(store: Arc<CredentialStore>, sessions: Arc<SessionManager>, prompter: P, out: W, opts: ConsoleOptions) -> Self {
        Self {
            provider: LocalAuthProvider::new(store.clone(), sessions.clone()),
            gate: AuthorizationGate::new(store.clone(), sessions.clone()),
            store,
            sessions,
            prompter,
            out,
            opts,
            current: None,
        }
    }

    pub fn into_parts(self) -> (P, W) { (self.prompter, self.out) }

    /// Runs until `exit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        info!("console.start version={}", self.opts.version);
        self.print_banner()?;
        loop {
            if self.current.is_none() {
                let res = if self.store.has_root_account().map_err(|e| io::Error::new(io::ErrorKind::Other, e))? {
                    self.login()
                } else {
                    self.first_run_setup()
                };
                match res {
                    Ok(()) => {}
                    Err(InputError::Cancelled) => { writeln!(self.out, "\nOperation cancelled")?; continue; }
                    Err(InputError::Eof) => break,
                    Err(e) => return Err(input_to_io(e)),
                }
                if self.current.is_none() { continue; }
                let role = self.current_role();
                write!(self.out, "{}", outputformatter::help(role))?;
            }

            if !self.check_session()? { continue; }
            let prompt = self.prompt();
            let line = match self.prompter.read_line(&prompt) {
                Ok(l) => l,
                Err(InputError::Cancelled) => { writeln!(self.out, "\nOperation cancelled. Use 'exit' to quit")?; continue; }
                Err(InputError::Eof) => break,
                Err(e) => return Err(input_to_io(e)),
            };
            let line = line.trim().to_string();
            if line.is_empty() { continue; }
            self.prompter.add_history(&line);

            // The session may have idled out while the prompt was waiting.
            if !self.session_alive() {
                self.expire_current()?;
                continue;
            }
            self.sessions.update_activity();

            match self.dispatch(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(InputError::Cancelled) => writeln!(self.out, "Operation cancelled")?,
                Err(InputError::Eof) => break,
                Err(e) => return Err(input_to_io(e)),
            }
        }
        self.sessions.clear();
        writeln!(self.out, "\nGoodbye!")?;
        info!("console.exit");
        Ok(())
    }

    fn print_banner(&mut self) -> io::Result<()> {
        write!(self.out, "{}", outputformatter::banner())?;
        if let Some((u, p)) = self.opts.dev_credentials.clone() {
            write!(self.out, "{}", outputformatter::dev_warning(&u, &p))?;
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        match &self.current {
            Some(c) if c.dev => format!("[DEV] {}@phantom> ", c.name),
            Some(c) => format!("{}@phantom> ", c.name),
            None => "phantom> ".to_string(),
        }
    }

    fn current_role(&self) -> Option<Role> {
        let c = self.current.as_ref()?;
        self.gate.session_role(&c.token)
    }

    fn session_alive(&self) -> bool {
        self.current.as_ref().map(|c| self.sessions.validate(&c.token)).unwrap_or(false)
    }

    fn expire_current(&mut self) -> io::Result<()> {
        if let Some(c) = self.current.take() { info!("console.session_expired user={}", c.name); }
        writeln!(self.out, "\nSession expired. Please log in again.")
    }

    /// False (and back to login) when the session is gone; warns when it is about to go.
    fn check_session(&mut self) -> io::Result<bool> {
        if !self.session_alive() {
            self.expire_current()?;
            return Ok(false);
        }
        let remaining = self.sessions.remaining_time();
        if remaining <= self.opts.warn_threshold {
            writeln!(self.out, "\nWarning: Session will expire in {} seconds", remaining)?;
        }
        Ok(true)
    }

    // ── Login ───────────────────────────────────────────────────────

    fn first_run_setup(&mut self) -> Result<(), InputError> {
        self.say(&outputformatter::section("First Time Setup", &["No root account found. Let's create one".to_string()]))?;
        loop {
            let name = self.prompter.read_line("Root Username: ")?.trim().to_string();
            let Some(password) = self.read_new_password()? else { continue };
            match self.provider.bootstrap(&name, &password) {
                Ok(LoginOutcome::Authenticated { token, .. }) => {
                    self.sayln("Root account created successfully!")?;
                    self.current = Some(CurrentUser { name, token, dev: false });
                    return Ok(());
                }
                Ok(LoginOutcome::Denied(_)) => return Ok(()),
                // Someone else finished setup first; fall through to the normal login.
                Err(LoginError::Account(AccountError::AlreadyInitialized)) => return Ok(()),
                Err(e) => self.report_login_error(&e)?,
            }
        }
    }

    fn login(&mut self) -> Result<(), InputError> {
        self.say(&outputformatter::section("Login", &["Please enter your credentials".to_string()]))?;
        let username = self.prompter.read_line("Username: ")?.trim().to_string();
        let password = self.prompter.read_password("Password: ")?;
        match self.provider.login(&LoginRequest::new(username.clone(), password)) {
            Ok(LoginOutcome::Authenticated { token, role, dev }) => {
                info!("console.login user={} role={} dev={}", username, role, dev);
                self.sayln(&format!("Welcome back, {}!", username))?;
                self.current = Some(CurrentUser { name: username, token, dev });
            }
            Ok(LoginOutcome::Denied(result)) => self.report_denied(result)?,
            Err(e) => self.report_login_error(&e)?,
        }
        Ok(())
    }

    fn report_denied(&mut self, result: AuthResult) -> Result<(), InputError> {
        self.sayln("Invalid username or password")?;
        match result {
            AuthResult::Rejected { remaining_attempts } => {
                self.sayln(&format!("{} attempts remaining", remaining_attempts))?
            }
            AuthResult::JustLocked => self.sayln("Too many failed attempts. Account has been locked.")?,
            _ => {}
        }
        Ok(())
    }

    fn report_login_error(&mut self, e: &LoginError) -> Result<(), InputError> {
        match e {
            LoginError::Account(a) if !a.is_internal() => self.sayln(&a.to_string()),
            other => {
                error!("console.login failed: {}", other);
                self.sayln("An unexpected error occurred. Please try again.")
            }
        }
    }

    /// Prompts for a password twice; `None` when they differ or the password is too weak.
    fn read_new_password(&mut self) -> Result<Option<String>, InputError> {
        let reqs = self.store.password_policy().requirements();
        self.say(&outputformatter::password_requirements(&reqs))?;
        let password = self.prompter.read_password("Password: ")?;
        let confirm = self.prompter.read_password("Confirm Password: ")?;
        if password != confirm {
            self.sayln("Passwords do not match")?;
            return Ok(None);
        }
        if let Err(v) = self.store.password_policy().validate_strength(&password) {
            self.sayln(&v.to_string())?;
            return Ok(None);
        }
        Ok(Some(password))
    }

    // ── Commands ────────────────────────────────────────────────────

    fn dispatch(&mut self, line: &str) -> Result<Flow, InputError> {
        let Some(cmd) = Command::parse(line) else { return Ok(Flow::Continue) };
        let Some(current) = self.current.clone() else { return Ok(Flow::Continue) };
        debug!("console.command user={} cmd={:?}", current.name, cmd.kind());

        if self.opts.debug {
            let role = self.current_role();
            self.sayln(&format!("DEBUG: Current User: {}", current.name))?;
            self.sayln(&format!("DEBUG: User Role: {}", role.map(|r| r.as_str()).unwrap_or("none")))?;
        }

        if !self.gate.check_command_allowed(&current.token, cmd.kind()) {
            if !self.session_alive() {
                self.expire_current().map_err(|e| InputError::Io(e.to_string()))?;
                return Ok(Flow::Continue);
            }
            info!("console.denied user={} cmd={:?}", current.name, cmd.kind());
            self.sayln("Access denied. Root privileges required.")?;
            return Ok(Flow::Continue);
        }

        match cmd {
            Command::Help => {
                let role = self.current_role();
                self.say(&outputformatter::help(role))?;
            }
            Command::Clear => {
                self.prompter.clear_screen();
                self.print_banner().map_err(|e| InputError::Io(e.to_string()))?;
            }
            Command::Info => {
                let version = self.opts.version.clone();
                self.say(&outputformatter::info(&version))?;
            }
            Command::Logout => {
                self.sessions.clear();
                self.current = None;
                info!("console.logout user={}", current.name);
                self.sayln("Logged out successfully")?;
            }
            Command::Exit => return Ok(Flow::Exit),
            Command::Unknown(word) => {
                self.sayln(&format!("Unknown command: {}", word))?;
                let role = self.current_role();
                self.say(&outputformatter::help(role))?;
            }
            Command::User(sub) => self.user_command(&current, sub)?,
        }
        Ok(Flow::Continue)
    }

    fn user_command(&mut self, current: &CurrentUser, sub: UserCommand) -> Result<(), InputError> {
        match sub {
            UserCommand::Menu => self.say(&outputformatter::user_help()),
            UserCommand::Unknown(s) => self.sayln(&format!("Unknown subcommand: {}", s)),
            UserCommand::List => self.list_accounts(),
            UserCommand::Create => self.create_account(current),
            UserCommand::Delete(None) => self.sayln("Usage: user delete <username>"),
            UserCommand::Delete(Some(name)) => self.delete_account(current, &name),
            UserCommand::Update(None) => self.sayln("Usage: user update <username>"),
            UserCommand::Update(Some(name)) => self.update_account(current, &name),
            UserCommand::Upgrade(None) => self.sayln("Usage: user upgrade <username>"),
            UserCommand::Upgrade(Some(name)) => self.upgrade_account(current, &name),
        }
    }

    fn list_accounts(&mut self) -> Result<(), InputError> {
        match self.store.list_accounts() {
            Ok(accts) if accts.is_empty() => self.sayln("No users found"),
            Ok(accts) => self.say(&outputformatter::account_table(&accts)),
            Err(e) => self.report_account_error(&e),
        }
    }

    fn create_account(&mut self, current: &CurrentUser) -> Result<(), InputError> {
        self.say(&outputformatter::section("Create New User", &["Please enter the new user details".to_string()]))?;
        let name = self.prompter.read_line("Username: ")?.trim().to_string();
        let Some(password) = self.read_new_password()? else { return Ok(()) };
        let Some(role) = self.read_role()? else { return Ok(()) };
        if !self.still_allowed(current, CommandKind::UserCreate)? { return Ok(()); }
        match self.store.create_account(&name, &password, role) {
            Ok(()) => self.sayln(&format!("User '{}' created successfully", name)),
            Err(e) => self.report_account_error(&e),
        }
    }

    fn delete_account(&mut self, current: &CurrentUser, name: &str) -> Result<(), InputError> {
        if name == current.name {
            return self.sayln("Cannot delete your own account");
        }
        self.sayln(&format!("Warning: You are about to delete user '{}'", name))?;
        let confirm = self.prompter.read_line("Are you sure? (y/N): ")?;
        if !confirm.trim().eq_ignore_ascii_case("y") {
            return self.sayln("Operation cancelled");
        }
        if !self.still_allowed(current, CommandKind::UserDelete)? { return Ok(()); }
        match self.store.delete_account(name) {
            Ok(()) => self.sayln("User deleted successfully"),
            Err(e) => self.report_account_error(&e),
        }
    }

    fn update_account(&mut self, current: &CurrentUser, name: &str) -> Result<(), InputError> {
        match self.store.get_role(name) {
            Ok(Some(_)) if !self.store.is_dev_user(name) => {}
            Ok(_) => return self.report_account_error(&AccountError::NotFound(name.to_string())),
            Err(e) => return self.report_account_error(&e),
        }
        loop {
            self.say(&outputformatter::update_menu())?;
            let choice = self.prompter.read_line("Choice (1-4): ")?;
            let update = match choice.trim() {
                "1" => {
                    let new_name = self.prompter.read_line("New Username: ")?.trim().to_string();
                    AccountUpdate::rename(new_name)
                }
                "2" => match self.read_new_password()? {
                    Some(pw) => AccountUpdate::password(pw),
                    None => continue,
                },
                "3" => match self.read_role()? {
                    Some(role) => AccountUpdate::role(role),
                    None => continue,
                },
                "4" => return Ok(()),
                _ => {
                    self.sayln("Invalid choice")?;
                    continue;
                }
            };
            if !self.still_allowed(current, CommandKind::UserUpdate)? { return Ok(()); }
            return match self.store.update_account(name, &update) {
                Ok(()) => self.sayln("User updated successfully"),
                Err(e) => self.report_account_error(&e),
            };
        }
    }

    fn upgrade_account(&mut self, current: &CurrentUser, name: &str) -> Result<(), InputError> {
        self.sayln(&format!("Warning: You are about to upgrade '{}' to root privileges", name))?;
        let root_password = self.prompter.read_password("Root Password: ")?;
        if !self.still_allowed(current, CommandKind::UserUpgrade)? { return Ok(()); }
        match self.gate.promote(&current.token, name, &root_password) {
            Ok(true) => self.sayln(&format!("User '{}' upgraded to root", name)),
            Ok(false) => self.sayln("Access denied. Root privileges required."),
            Err(AccountError::StepUpFailed) => self.sayln("Invalid root password"),
            Err(e) => self.report_account_error(&e),
        }
    }

    /// Re-checks the gate after a dialog; the session may have idled out while
    /// the operator was typing. Nothing is changed when this returns false.
    fn still_allowed(&mut self, current: &CurrentUser, kind: CommandKind) -> Result<bool, InputError> {
        if self.gate.check_command_allowed(&current.token, kind) { return Ok(true); }
        if self.session_alive() {
            self.sayln("Access denied. Root privileges required.")?;
        } else {
            self.expire_current().map_err(|e| InputError::Io(e.to_string()))?;
        }
        Ok(false)
    }

    fn read_role(&mut self) -> Result<Option<Role>, InputError> {
        self.say(&outputformatter::role_menu())?;
        match self.prompter.read_line("Choice (1-2): ")?.trim() {
            "1" => Ok(Some(Role::Admin)),
            "2" => Ok(Some(Role::User)),
            _ => {
                self.sayln("Invalid role choice")?;
                Ok(None)
            }
        }
    }

    fn report_account_error(&mut self, e: &AccountError) -> Result<(), InputError> {
        if e.is_internal() {
            error!("console.account error code={} err={}", e.code_str(), e);
            return self.sayln("An unexpected error occurred. Please try again.");
        }
        self.sayln(&e.to_string())
    }

    fn say(&mut self, s: &str) -> Result<(), InputError> {
        self.out.write_all(s.as_bytes()).map_err(|e| InputError::Io(e.to_string()))
    }

    fn sayln(&mut self, s: &str) -> Result<(), InputError> {
        writeln!(self.out, "{}", s).map_err(|e| InputError::Io(e.to_string()))
    }
}
