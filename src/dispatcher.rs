use crate::codec::LogMarker;
use crate::command::Command;
use crate::error::{LinkError, Result};
use crate::handshake::{Clock, Handshake, LinkPhase};
use crate::store::LogStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outbound channel to the remote device.
pub trait Transmitter: Send + Sync {
    fn transmit(&self, payload: &[u8]) -> std::io::Result<()>;
}

/// Result of a single pump attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Head of the queue went out; the link is now awaiting its log block.
    Sent,
    /// A stalled session was abandoned and the next command went out.
    RecoveredAndSent,
    /// A stalled session was abandoned; nothing was queued.
    Recovered,
    /// A session is in progress; queued commands stay put.
    Waiting,
    /// Idle with nothing to send.
    Idle,
}

impl PumpOutcome {
    pub fn sent(self) -> bool {
        matches!(self, PumpOutcome::Sent | PumpOutcome::RecoveredAndSent)
    }

    pub fn recovered(self) -> bool {
        matches!(self, PumpOutcome::Recovered | PumpOutcome::RecoveredAndSent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub phase: LinkPhase,
    pub queued: usize,
    pub commands_sent: u64,
    pub timeouts_recovered: u64,
    pub since_log_activity: Duration,
}

#[derive(Debug)]
struct DispatchState {
    queue: VecDeque<Command>,
    handshake: Handshake,
    commands_sent: u64,
    timeouts_recovered: u64,
}

/// FIFO of pending commands with single-flight sending.
///
/// The queue and the handshake live under one lock so a `log_end` arriving on
/// the ingress path and a `submit` from the issuer cannot both send.
pub struct CommandDispatcher {
    state: Mutex<DispatchState>,
    transmitter: Arc<dyn Transmitter>,
    store: Arc<LogStore>,
    clock: Arc<dyn Clock>,
}

impl CommandDispatcher {
    pub fn new(
        transmitter: Arc<dyn Transmitter>,
        store: Arc<LogStore>,
        clock: Arc<dyn Clock>,
        log_timeout: Duration,
    ) -> Self {
        let handshake = Handshake::new(clock.now(), log_timeout);
        Self {
            state: Mutex::new(DispatchState {
                queue: VecDeque::new(),
                handshake,
                commands_sent: 0,
                timeouts_recovered: 0,
            }),
            transmitter,
            store,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `command` (if any) and makes one pump attempt, falling back to
    /// the stalled-session check when nothing could be sent.
    pub fn enqueue_and_pump(&self, command: Option<Command>) -> Result<PumpOutcome> {
        let mut state = self.lock();
        if let Some(command) = command {
            info!(command = %command.command, queued = state.queue.len() + 1, "command queued");
            state.queue.push_back(command);
        }
        self.pump_locked(&mut state)
    }

    pub fn pump(&self) -> Result<PumpOutcome> {
        self.enqueue_and_pump(None)
    }

    /// Applies a log-sourced message to the handshake.
    ///
    /// Every log message resets the inactivity clock. `log_end` also returns
    /// the link to idle and pumps the queue, reported as `Some(outcome)`.
    pub fn observe_log(&self, marker: Option<LogMarker>) -> Result<Option<PumpOutcome>> {
        let mut state = self.lock();
        let now = self.clock.now();
        state.handshake.record_log_activity(now);

        match marker {
            Some(LogMarker::Start) => {
                state.handshake.log_started();
                info!("log download started");
                Ok(None)
            }
            Some(LogMarker::End) => {
                state.handshake.log_ended();
                info!("log download ended");
                self.pump_locked(&mut state).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.lock().handshake.phase()
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        let state = self.lock();
        DispatcherSnapshot {
            phase: state.handshake.phase(),
            queued: state.queue.len(),
            commands_sent: state.commands_sent,
            timeouts_recovered: state.timeouts_recovered,
            since_log_activity: self
                .clock
                .now()
                .saturating_duration_since(state.handshake.last_log_activity()),
        }
    }

    // At most one retry after a forced recovery, never a loop over the backlog.
    fn pump_locked(&self, state: &mut DispatchState) -> Result<PumpOutcome> {
        let mut recovered = false;
        for _ in 0..2 {
            if !state.handshake.is_awaiting() {
                if let Some(command) = state.queue.pop_front() {
                    self.dispatch(state, command)?;
                    return Ok(if recovered {
                        PumpOutcome::RecoveredAndSent
                    } else {
                        PumpOutcome::Sent
                    });
                }
            }

            if recovered {
                break;
            }
            let now = self.clock.now();
            if !state.handshake.expire_if_stalled(now) {
                break;
            }
            recovered = true;
            state.timeouts_recovered += 1;
            warn!(
                timeout_s = state.handshake.timeout().as_secs_f64(),
                queued = state.queue.len(),
                "log download stalled, returning to idle"
            );
            if state.queue.is_empty() {
                break;
            }
        }

        Ok(match (recovered, state.handshake.phase()) {
            (true, _) => PumpOutcome::Recovered,
            (false, LinkPhase::Awaiting) => {
                debug!(queued = state.queue.len(), "session in progress, holding queue");
                PumpOutcome::Waiting
            }
            (false, LinkPhase::Idle) => PumpOutcome::Idle,
        })
    }

    fn dispatch(&self, state: &mut DispatchState, command: Command) -> Result<()> {
        // A command that cannot serialize never will; it is dropped, not requeued.
        let payload = serde_json::to_vec(&command)?;
        if let Err(e) = self.transmitter.transmit(&payload) {
            warn!(command = %command.command, "transmit failed, command requeued: {e}");
            state.queue.push_front(command);
            return Err(LinkError::Transmit(e));
        }

        state.handshake.command_dispatched(self.clock.now());
        state.commands_sent += 1;
        info!(command = %command.command, device = ?command.device, sensor = ?command.sensor, "command sent");

        self.store.append(&command)?;
        Ok(())
    }
}

