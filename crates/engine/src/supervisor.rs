use crate::error::EngineError;
use api_client::BrokerSession;
use configuration::SupervisorSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where the supervised session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    HealthCheck,
}

/// Keeps one broker session alive for a polling loop.
///
/// The loop calls [`on_cycle`](Self::on_cycle) once per iteration. Every
/// `health_check_every` cycles the session is probed; a failed probe switches to
/// `Disconnected` and `connect` is retried at a fixed delay until it succeeds.
pub struct ReconnectionSupervisor {
    session: Arc<dyn BrokerSession>,
    settings: SupervisorSettings,
    state: SessionState,
    cycles_since_check: u32,
    check_requested: bool,
}

impl ReconnectionSupervisor {
    pub fn new(session: Arc<dyn BrokerSession>, settings: SupervisorSettings) -> Self {
        Self {
            session,
            settings,
            state: SessionState::Disconnected,
            cycles_since_check: 0,
            check_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &Arc<dyn BrokerSession> {
        &self.session
    }

    /// Forces a health check on the next cycle, e.g. after a request failed
    /// because the session was gone.
    pub fn request_health_check(&mut self) {
        self.check_requested = true;
    }

    /// Cold-start connect with a bounded number of attempts.
    ///
    /// Returns the number of attempts it took. Running out of attempts is fatal
    /// for the process.
    pub async fn connect_with_retry(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<u32, EngineError> {
        let attempts = self.settings.startup_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.state = SessionState::Connecting;
            info!(broker = self.session.name(), attempt, attempts, "Connecting");
            match self.session.connect().await {
                Ok(()) => {
                    self.mark_connected();
                    info!(broker = self.session.name(), "Connected successfully");
                    return Ok(attempt);
                }
                Err(e) => {
                    self.state = SessionState::Disconnected;
                    warn!(broker = self.session.name(), attempt, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }
            if attempt < attempts && !sleep_or_cancel(self.settings.startup_retry_delay, cancel).await {
                return Err(EngineError::Cancelled);
            }
        }

        Err(EngineError::SessionUnavailable {
            broker: self.session.name().to_string(),
            attempts,
            last_error,
        })
    }

    /// Retries `connect` at a fixed delay until it succeeds.
    ///
    /// Returns the number of attempts, or `None` if cancelled first.
    pub async fn reconnect(&mut self, cancel: &CancellationToken) -> Option<u32> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            attempt += 1;
            self.state = SessionState::Connecting;
            match self.session.connect().await {
                Ok(()) => {
                    self.mark_connected();
                    info!(broker = self.session.name(), attempt, "Reconnected successfully");
                    return Some(attempt);
                }
                Err(e) => {
                    self.state = SessionState::Disconnected;
                    warn!(broker = self.session.name(), attempt, error = %e, "Reconnection failed. Retrying...");
                }
            }
            if !sleep_or_cancel(self.settings.reconnect_delay, cancel).await {
                return None;
            }
        }
    }

    /// Advances the cycle counter, runs a due health check and reconnects if
    /// needed. Returns `true` when the session is usable this cycle.
    ///
    /// A scheduled check is held back while `busy` is set, for at most one extra
    /// interval; a requested one is not held back.
    pub async fn on_cycle(&mut self, busy: bool, cancel: &CancellationToken) -> bool {
        self.cycles_since_check = self.cycles_since_check.saturating_add(1);

        let every = self.settings.health_check_every;
        let overdue = self.cycles_since_check >= every.saturating_mul(2);
        let scheduled = self.cycles_since_check >= every && (!busy || overdue);
        if self.state == SessionState::Connected && (scheduled || self.check_requested) {
            self.state = SessionState::HealthCheck;
            self.cycles_since_check = 0;
            self.check_requested = false;
            if self.session.is_connected().await {
                self.state = SessionState::Connected;
            } else {
                warn!(broker = self.session.name(), "Health check failed; session lost");
                self.state = SessionState::Disconnected;
            }
        }

        if self.state != SessionState::Connected {
            self.reconnect(cancel).await;
        }
        self.state == SessionState::Connected
    }

    fn mark_connected(&mut self) {
        self.state = SessionState::Connected;
        self.cycles_since_check = 0;
        self.check_requested = false;
    }
}

/// Sleeps for `delay`; returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
