use crate::codec::Datagram;
use crate::command::Command;
use crate::config::LinkConfig;
use crate::devices::DeviceId;
use crate::dispatcher::{CommandDispatcher, PumpOutcome, Transmitter};
use crate::error::Result;
use crate::handshake::{Clock, LinkPhase, SystemClock};
use crate::ingress::{Ingested, IngressCounters, IngressProcessor, LinkSink};
use crate::store::{FailureStats, LogStore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub datagrams: u64,
    pub invalid_datagrams: u64,
    #[serde(flatten)]
    pub ingress: IngressCounters,
    pub commands_sent: u64,
    pub timeouts_recovered: u64,
    pub queued: usize,
    pub phase: LinkPhase,
}

/// Ground-side endpoint for one device session.
///
/// Owns the dispatcher (queue + handshake), the ingress pipeline and the log
/// store. Safe to share between the receive loop and the command issuer.
pub struct GroundLink {
    dispatcher: Arc<CommandDispatcher>,
    ingress: IngressProcessor,
    store: Arc<LogStore>,
    datagrams: AtomicU64,
    invalid_datagrams: AtomicU64,
}

impl GroundLink {
    pub fn new(config: &LinkConfig, transmitter: Arc<dyn Transmitter>, sink: Arc<dyn LinkSink>) -> Self {
        Self::with_clock(config, transmitter, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &LinkConfig,
        transmitter: Arc<dyn Transmitter>,
        sink: Arc<dyn LinkSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(LogStore::new(config.logfile.clone()));
        let dispatcher = Arc::new(CommandDispatcher::new(
            transmitter,
            Arc::clone(&store),
            clock,
            config.log_timeout,
        ));

        let mut ingress = IngressProcessor::new(Arc::clone(&dispatcher), sink);
        if config.persist_failures {
            ingress = ingress.with_failure_persistence(Arc::clone(&store));
        }

        Self {
            dispatcher,
            ingress,
            store,
            datagrams: AtomicU64::new(0),
            invalid_datagrams: AtomicU64::new(0),
        }
    }

    /// Queues a command and pumps once.
    pub fn submit(&self, command: Command) -> Result<PumpOutcome> {
        self.dispatcher.enqueue_and_pump(Some(command))
    }

    /// Pump without a new command; also runs the stalled-session check.
    pub fn pump(&self) -> Result<PumpOutcome> {
        self.dispatcher.pump()
    }

    pub fn query_stats(&self, device: DeviceId) -> Result<FailureStats> {
        Ok(self.store.count_failures(device)?)
    }

    /// Handles one transport datagram (`{"recv_time": .., "message": ..}`).
    pub fn handle_datagram(&self, bytes: &[u8]) -> Result<Ingested> {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        let datagram = Datagram::from_slice(bytes).map_err(|e| {
            self.invalid_datagrams.fetch_add(1, Ordering::Relaxed);
            warn!(len = bytes.len(), "unreadable datagram: {e}");
            e
        })?;
        self.ingress.handle(&datagram.message)
    }

    /// Handles a raw line that arrived without an envelope.
    pub fn handle_line(&self, raw: &str) -> Result<Ingested> {
        self.ingress.handle(raw)
    }

    pub fn phase(&self) -> LinkPhase {
        self.dispatcher.phase()
    }

    pub fn queued(&self) -> usize {
        self.dispatcher.queued()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn stats(&self) -> LinkStats {
        let dispatch = self.dispatcher.snapshot();
        LinkStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            invalid_datagrams: self.invalid_datagrams.load(Ordering::Relaxed),
            ingress: self.ingress.counters(),
            commands_sent: dispatch.commands_sent,
            timeouts_recovered: dispatch.timeouts_recovered,
            queued: dispatch.queued,
            phase: dispatch.phase,
        }
    }
}
