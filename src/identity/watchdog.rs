use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use super::session::SessionManager;

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// Background thread that evicts an idle session and reports the owner.
pub struct SessionWatchdog {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionWatchdog {
    pub fn spawn<F>(sessions: Arc<SessionManager>, interval: Duration, mut on_expire: F) -> std::io::Result<Self>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new().name("session-watchdog".into()).spawn(move || {
            debug!("watchdog.start interval_ms={}", interval.as_millis());
            while !flag.load(Ordering::Acquire) {
                if let Some(user) = sessions.expire_if_idle() { on_expire(&user); }
                std::thread::park_timeout(interval);
            }
            debug!("watchdog.stop");
        })?;
        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            h.thread().unpark();
            if h.join().is_err() { warn!("watchdog thread panicked"); }
        }
    }
}

impl Drop for SessionWatchdog {
    fn drop(&mut self) { self.stop(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::sync::mpsc;

    #[test]
    fn reports_idle_session_once() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sessions = Arc::new(SessionManager::with_clock(Duration::from_secs(300), clock.clone()));
        sessions.create("erin").unwrap();
        let (tx, rx) = mpsc::channel();
        let _dog = SessionWatchdog::spawn(sessions.clone(), Duration::from_millis(10), move |u| {
            let _ = tx.send(u.to_string());
        })
        .unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        clock.advance(Duration::from_secs(301));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "erin");
        assert!(!sessions.is_active());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn drop_stops_the_thread() {
        let sessions = Arc::new(SessionManager::default());
        let dog = SessionWatchdog::spawn(sessions, Duration::from_secs(3600), |_| {}).unwrap();
        drop(dog);
    }
}
