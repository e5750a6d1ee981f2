//! Session expiry monitor.
//!
//! Polls the stored access token on a fixed interval, raises a single
//! warning per token once the expiry is within the warning threshold and
//! ends the session on the poll that observes expiry.

use crate::config::SessionConfig;
use crate::error::ApiResult;
use crate::services::AuthService;
use crate::traits::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    NoSession,
    /// Token without a readable `exp`; left to the backend to reject.
    Untracked,
    Active {
        #[serde(rename = "remainingSecs")]
        remaining_secs: i64,
    },
    Warning {
        #[serde(rename = "remainingSecs")]
        remaining_secs: i64,
    },
    Expired,
}

/// `Expired` iff `now >= exp`, `Warning` iff `exp - threshold <= now < exp`.
pub fn evaluate(now: DateTime<Utc>, exp: DateTime<Utc>, threshold: chrono::Duration) -> SessionState {
    if now >= exp {
        return SessionState::Expired;
    }
    let remaining_secs = (exp - now).num_seconds();
    if now >= exp - threshold {
        SessionState::Warning { remaining_secs }
    } else {
        SessionState::Active { remaining_secs }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    #[serde(flatten)]
    pub state: SessionState,
    pub expires_at: Option<DateTime<Utc>>,
    /// First poll to see this token inside the warning window.
    pub newly_warned: bool,
    pub logged_out: bool,
}

pub struct SessionMonitor {
    auth: AuthService,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    warning_threshold: chrono::Duration,
    warned_token: Mutex<Option<String>>,
}

/// Upper bound for the configured warning window.
const MAX_WARNING_THRESHOLD_SECS: u64 = 24 * 60 * 60;

fn warning_threshold(secs: u64) -> chrono::Duration {
    let clamped = secs.min(MAX_WARNING_THRESHOLD_SECS);
    if clamped < secs {
        tracing::warn!(configured = secs, used = clamped, "session warning threshold clamped");
    }
    chrono::Duration::seconds(clamped as i64)
}

impl SessionMonitor {
    pub fn new(auth: AuthService, clock: Arc<dyn Clock>, config: &SessionConfig) -> Self {
        Self {
            auth,
            clock,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            warning_threshold: warning_threshold(config.warning_threshold_secs),
            warned_token: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> SessionState {
        let Some(session) = self.auth.session().get() else {
            return SessionState::NoSession;
        };
        match session.expires_at() {
            Some(exp) => evaluate(self.clock.now(), exp, self.warning_threshold),
            None => SessionState::Untracked,
        }
    }

    /// One monitor cycle.
    pub fn poll(&self) -> PollOutcome {
        let session = self.auth.session().get();
        let expires_at = session.as_ref().and_then(|s| s.expires_at());
        let state = self.state();
        let mut outcome = PollOutcome {
            state,
            expires_at,
            newly_warned: false,
            logged_out: false,
        };

        match state {
            SessionState::Warning { remaining_secs } => {
                let token = session.map(|s| s.access_token);
                if let Ok(mut warned) = self.warned_token.lock() {
                    if *warned != token {
                        *warned = token;
                        outcome.newly_warned = true;
                        tracing::warn!(remaining_secs, "session expires soon");
                    }
                }
            }
            SessionState::Expired => {
                tracing::warn!("session expired, logging out");
                if let Err(e) = self.auth.session().clear() {
                    tracing::error!(error = %e, "failed to clear expired session");
                }
                outcome.logged_out = true;
            }
            _ => {}
        }
        outcome
    }

    /// Refresh the token pair. A failed refresh ends the session.
    pub async fn extend_session(&self) -> ApiResult<()> {
        match self.auth.refresh().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "session extension failed, logging out");
                if let Err(clear_err) = self.auth.session().clear() {
                    tracing::error!(error = %clear_err, "failed to clear session");
                }
                Err(e)
            }
        }
    }

    /// Run the poll loop on the current runtime.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (tx, rx) = watch::channel(self.poll());
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately and the initial poll already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(monitor.poll()).is_err() {
                    break;
                }
            }
        });
        MonitorHandle {
            monitor: self,
            rx,
            task,
        }
    }
}

/// Owns the monitor task; dropping it stops the polling.
pub struct MonitorHandle {
    monitor: Arc<SessionMonitor>,
    rx: watch::Receiver<PollOutcome>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn latest(&self) -> PollOutcome {
        self.rx.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<PollOutcome> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub async fn extend_session(&self) -> ApiResult<()> {
        self.monitor.extend_session().await
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
