use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::SessionError;
use crate::security::constant_time_eq;

pub type SessionToken = String;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct SessionState {
    token: SessionToken,
    username: String,
    last_activity: DateTime<Utc>,
}

fn gen_token() -> Result<SessionToken, SessionError> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| SessionError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Holder of the one live console session.
///
/// Every method takes the same lock, so the expiry check and the clear it
/// triggers are never split between the command loop and the watchdog.
pub struct SessionManager {
    state: Mutex<Option<SessionState>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(DEFAULT_SESSION_TIMEOUT) }
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self { Self::with_clock(timeout, Arc::new(SystemClock)) }

    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { state: Mutex::new(None), timeout, clock }
    }

    /// Starts a session for `username`, replacing whatever session existed.
    pub fn create(&self, username: &str) -> Result<SessionToken, SessionError> {
        let token = gen_token()?;
        let mut st = self.state.lock();
        if let Some(prev) = st.as_ref() { debug!("session.replace previous_user={}", prev.username); }
        *st = Some(SessionState { token: token.clone(), username: username.to_string(), last_activity: self.clock.now() });
        info!("session.issue user={} ttl_secs={}", username, self.timeout.as_secs());
        Ok(token)
    }

    /// Checks `token` against the live session. An expired session is cleared
    /// before returning false. Activity is not refreshed.
    pub fn validate(&self, token: &str) -> bool {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let Some(s) = st.as_ref() else { return false };
        if !constant_time_eq(s.token.as_bytes(), token.as_bytes()) { return false; }
        if self.idle_exceeded(s, now) {
            info!("session.expire user={}", s.username);
            *st = None;
            return false;
        }
        true
    }

    pub fn update_activity(&self) {
        let now = self.clock.now();
        if let Some(s) = self.state.lock().as_mut() { s.last_activity = now; }
    }

    /// True when there is no session or it has been idle past the timeout.
    pub fn is_expired(&self) -> bool {
        let now = self.clock.now();
        match self.state.lock().as_ref() {
            Some(s) => self.idle_exceeded(s, now),
            None => true,
        }
    }

    pub fn clear(&self) {
        if let Some(s) = self.state.lock().take() { info!("session.clear user={}", s.username); }
    }

    /// Whole seconds left before the session idles out; 0 when there is none.
    pub fn remaining_time(&self) -> u64 {
        let now = self.clock.now();
        match self.state.lock().as_ref() {
            Some(s) => {
                let idle = (now - s.last_activity).num_seconds().max(0) as u64;
                self.timeout.as_secs().saturating_sub(idle)
            }
            None => 0,
        }
    }

    pub fn username(&self) -> Option<String> { self.state.lock().as_ref().map(|s| s.username.clone()) }

    pub fn is_active(&self) -> bool { self.state.lock().is_some() }

    /// Clears an idle session in one step and returns its owner.
    pub fn expire_if_idle(&self) -> Option<String> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let expired = st.as_ref().map(|s| self.idle_exceeded(s, now)).unwrap_or(false);
        if !expired { return None; }
        let s = st.take()?;
        info!("session.expire user={} idle_timeout_secs={}", s.username, self.timeout.as_secs());
        Some(s.username)
    }

    fn idle_exceeded(&self, s: &SessionState, now: DateTime<Utc>) -> bool {
        match (now - s.last_activity).to_std() {
            Ok(idle) => idle > self.timeout,
            // last_activity in the future (clock stepped back): not idle
            Err(_) => false,
        }
    }
}
