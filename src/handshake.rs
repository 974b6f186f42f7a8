use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Inactivity window after which an outstanding log download is abandoned.
pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(15);

/// Time source for the inactivity clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to simulate stalled sessions.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkPhase {
    /// No log block outstanding; the next queued command may be sent.
    Idle,
    /// A log-retrieval request is in flight or a block is streaming.
    Awaiting,
}

/// Log-download handshake: whether a block is expected and when the link
/// last heard anything log-sourced.
#[derive(Debug, Clone)]
pub struct Handshake {
    awaiting_log_block: bool,
    last_log_activity: Instant,
    timeout: Duration,
}

impl Handshake {
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self {
            awaiting_log_block: false,
            last_log_activity: now,
            timeout,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        if self.awaiting_log_block {
            LinkPhase::Awaiting
        } else {
            LinkPhase::Idle
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting_log_block
    }

    pub fn last_log_activity(&self) -> Instant {
        self.last_log_activity
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Any log-sourced message resets the inactivity clock.
    pub fn record_log_activity(&mut self, now: Instant) {
        self.last_log_activity = now;
    }

    /// `log_start` received. Idempotent while already awaiting.
    pub fn log_started(&mut self) {
        self.awaiting_log_block = true;
    }

    /// `log_end` received.
    pub fn log_ended(&mut self) {
        self.awaiting_log_block = false;
    }

    /// A command went out; the inactivity window starts now.
    pub fn command_dispatched(&mut self, now: Instant) {
        self.awaiting_log_block = true;
        self.last_log_activity = now;
    }

    pub fn is_stalled(&self, now: Instant) -> bool {
        self.awaiting_log_block
            && now.saturating_duration_since(self.last_log_activity) >= self.timeout
    }

    /// Forces `Idle` when the session has stalled. Returns whether it did.
    pub fn expire_if_stalled(&mut self, now: Instant) -> bool {
        if self.is_stalled(now) {
            self.awaiting_log_block = false;
            true
        } else {
            false
        }
    }
}
