use crate::codec::{self, LogMarker, MessageKind, ParsedMessage, Payload};
use crate::devices::DeviceId;
use crate::dispatcher::{CommandDispatcher, PumpOutcome};
use crate::error::Result;
use crate::store::LogStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimal projection of a telemetry message handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub device: DeviceId,
    pub sensor: String,
    #[serde(flatten)]
    pub reading: Payload,
}

impl From<&ParsedMessage> for Observation {
    fn from(message: &ParsedMessage) -> Self {
        Self {
            device: message.device,
            sensor: message.sensor.clone(),
            reading: message.payload.clone(),
        }
    }
}

/// A WARNING/ERROR reading. Also the record shape persisted when failure
/// persistence is enabled, which is what `LogStore::count_failures` reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub device: DeviceId,
    pub sensor: String,
    pub failure: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionReport {
    pub line: String,
    pub declared: u64,
    pub computed: u64,
}

/// Consumer of decoded traffic. Calls are fire-and-forget.
pub trait LinkSink: Send + Sync {
    fn on_telemetry(&self, observation: &Observation);
    fn on_failure(&self, failure: &FailureReport);
    fn on_corruption(&self, _report: &CorruptionReport) {}
}

/// Sink that writes everything to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LinkSink for TracingSink {
    fn on_telemetry(&self, observation: &Observation) {
        match &observation.reading {
            Payload::Value(value) => info!(device = %observation.device, sensor = %observation.sensor, %value, "telemetry"),
            Payload::Failure(failure) => warn!(device = %observation.device, sensor = %observation.sensor, %failure, "telemetry"),
        }
    }

    fn on_failure(&self, failure: &FailureReport) {
        warn!(device = %failure.device, sensor = %failure.sensor, failure = %failure.failure, "logged failure");
    }
}

/// What happened to one inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Telemetry,
    LogControl {
        marker: LogMarker,
        pump: Option<PumpOutcome>,
    },
    LogFailure,
    LogValue,
    Malformed,
    Corrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressCounters {
    pub lines: u64,
    pub telemetry: u64,
    pub failures: u64,
    pub malformed: u64,
    pub corrupted: u64,
}

#[derive(Debug, Default)]
struct AtomicCounters {
    lines: AtomicU64,
    telemetry: AtomicU64,
    failures: AtomicU64,
    malformed: AtomicU64,
    corrupted: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// decode -> classify -> route, once per inbound line.
pub struct IngressProcessor {
    dispatcher: Arc<CommandDispatcher>,
    sink: Arc<dyn LinkSink>,
    failure_store: Option<Arc<LogStore>>,
    counters: AtomicCounters,
}

impl IngressProcessor {
    pub fn new(dispatcher: Arc<CommandDispatcher>, sink: Arc<dyn LinkSink>) -> Self {
        Self {
            dispatcher,
            sink,
            failure_store: None,
            counters: AtomicCounters::default(),
        }
    }

    /// Also append every failure observation to `store`.
    pub fn with_failure_persistence(mut self, store: Arc<LogStore>) -> Self {
        self.failure_store = Some(store);
        self
    }

    pub fn counters(&self) -> IngressCounters {
        let c = &self.counters;
        IngressCounters {
            lines: c.lines.load(Ordering::Relaxed),
            telemetry: c.telemetry.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            corrupted: c.corrupted.load(Ordering::Relaxed),
        }
    }

    /// Processes one raw line.
    ///
    /// Bad input never errors; it is reported through the returned
    /// [`Ingested`]. Errors come only from the store or from a pump
    /// triggered by `log_end`.
    pub fn handle(&self, raw: &str) -> Result<Ingested> {
        bump(&self.counters.lines);

        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(codec::DecodeError::Corrupted { declared, computed }) => {
                bump(&self.counters.corrupted);
                warn!(declared, computed, line = raw.trim(), "damaged message, checksum mismatch");
                self.sink.on_corruption(&CorruptionReport {
                    line: raw.trim().to_string(),
                    declared,
                    computed,
                });
                return Ok(Ingested::Corrupted);
            }
            Err(e) => {
                bump(&self.counters.malformed);
                debug!(line = raw.trim(), "dropping line: {e}");
                return Ok(Ingested::Malformed);
            }
        };

        match message.kind() {
            MessageKind::Telemetry(payload) => {
                bump(&self.counters.telemetry);
                self.sink.on_telemetry(&Observation::from(&message));
                if let Payload::Failure(text) = payload {
                    self.persist_failure(&failure_report(&message, text))?;
                }
                Ok(Ingested::Telemetry)
            }
            MessageKind::LogControl(marker) => {
                let pump = self.dispatcher.observe_log(Some(marker))?;
                Ok(Ingested::LogControl { marker, pump })
            }
            MessageKind::LogData(Payload::Failure(text)) => {
                self.dispatcher.observe_log(None)?;
                bump(&self.counters.failures);
                let report = failure_report(&message, text);
                self.sink.on_failure(&report);
                self.persist_failure(&report)?;
                Ok(Ingested::LogFailure)
            }
            MessageKind::LogData(Payload::Value(_)) => {
                self.dispatcher.observe_log(None)?;
                Ok(Ingested::LogValue)
            }
        }
    }

    fn persist_failure(&self, report: &FailureReport) -> Result<()> {
        if let Some(store) = &self.failure_store {
            store.append(report)?;
        }
        Ok(())
    }
}

fn failure_report(message: &ParsedMessage, text: &str) -> FailureReport {
    FailureReport {
        device: message.device,
        sensor: message.sensor.clone(),
        failure: text.to_string(),
    }
}
