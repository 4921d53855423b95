//! Reconnect policy and the connect/refresh session state machine.
//!
//! Ordinary disconnects are retried with exponential backoff up to a
//! configurable ceiling. 401-equivalent rejections go through token refresh
//! instead, capped at [`MAX_TOKEN_REFRESHES`] per connect cycle, a tighter
//! and independent limit. Both counters live in [`RetryState`] and are
//! mutated only through its methods.

use std::time::Duration;

/// Connection lifecycle as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Consecutive 401-triggered refresh attempts allowed within one connect
/// cycle before the session fails terminally.
pub const MAX_TOKEN_REFRESHES: u32 = 2;

/// Exponential backoff configuration for unexpected disconnects.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Retry ceiling for ordinary (non-auth) disconnects.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry attempt `attempt` (zero-based):
    /// `min(initial · 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Retry counters for one connect cycle.
///
/// Owned by the manager and mutated only through these methods; the
/// transport never touches it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    refreshes: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a reconnect attempt; returns the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Reset the attempt counter after a successful connect.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// Count a token refresh; returns the new total.
    pub fn record_refresh(&mut self) -> u32 {
        self.refreshes += 1;
        self.refreshes
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }

    pub fn refreshes_exhausted(&self) -> bool {
        self.refreshes >= MAX_TOKEN_REFRESHES
    }

    pub fn attempts_exhausted(&self, config: &ReconnectConfig) -> bool {
        self.attempts >= config.max_attempts
    }
}

/// Phase of one connect/reconnect session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    RefreshingToken,
    Connected,
    Reconnecting,
    Failed,
}

/// Observable outcome fed into the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake completed.
    ConnectOk,
    /// The handshake was rejected; `auth` marks a 401-equivalent rejection.
    ConnectRejected { auth: bool },
    /// An established socket closed; `clean` means an explicit `close()`.
    SocketClosed { clean: bool },
    /// Token refresh completed and new tokens are persisted.
    RefreshSucceeded,
    /// Token refresh failed (credentials already wiped).
    RefreshFailed,
}

impl SessionPhase {
    /// Advance the session by one event, updating the retry counters.
    ///
    /// Events that make no sense in the current phase leave it unchanged;
    /// the transitions mirror the coordination contract:
    ///
    /// ```text
    /// Idle → Connecting → Connected
    /// Connecting   --401--> RefreshingToken --ok--> Connecting (attempt+1)
    /// RefreshingToken --err--> Failed
    /// Connected    --drop--> Reconnecting --ok--> Connected
    /// Reconnecting --401--> RefreshingToken
    /// ```
    pub fn apply(
        self,
        event: SessionEvent,
        retry: &mut RetryState,
        config: &ReconnectConfig,
    ) -> SessionPhase {
        use SessionEvent::*;
        use SessionPhase::*;

        match (self, event) {
            (Connecting | Reconnecting, ConnectOk) => {
                retry.reset_attempts();
                Connected
            }
            (Connecting | Reconnecting, ConnectRejected { auth: true }) => {
                if retry.refreshes_exhausted() {
                    Failed
                } else {
                    retry.record_refresh();
                    RefreshingToken
                }
            }
            (Connecting, ConnectRejected { auth: false }) => Failed,
            (Reconnecting, ConnectRejected { auth: false }) => {
                if retry.attempts_exhausted(config) {
                    Failed
                } else {
                    retry.record_attempt();
                    Reconnecting
                }
            }
            (RefreshingToken, RefreshSucceeded) => {
                retry.record_attempt();
                Connecting
            }
            (RefreshingToken, RefreshFailed) => Failed,
            (Connected, SocketClosed { clean: true }) => Idle,
            (Connected, SocketClosed { clean: false }) => {
                if retry.attempts_exhausted(config) {
                    Failed
                } else {
                    retry.record_attempt();
                    Reconnecting
                }
            }
            (phase, _) => phase,
        }
    }
}
