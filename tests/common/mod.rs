#![allow(dead_code)]

use groundlink::codec::{encode, ParsedMessage, Payload, Source, LOG_END, LOG_START, SYSTEM_SENSOR};
use groundlink::devices::DeviceId;
use groundlink::handshake::ManualClock;
use groundlink::ingress::{CorruptionReport, FailureReport, LinkSink, Observation};
use groundlink::{Command, GroundLink, LinkConfig, Transmitter};
use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records every payload instead of sending it.
#[derive(Default)]
pub struct RecordingTransmitter {
    sent: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingTransmitter {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transmitter for RecordingTransmitter {
    fn transmit(&self, payload: &[u8]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "modem unreachable"));
        }
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub telemetry: Mutex<Vec<Observation>>,
    pub failures: Mutex<Vec<FailureReport>>,
    pub corruptions: Mutex<Vec<CorruptionReport>>,
}

impl LinkSink for RecordingSink {
    fn on_telemetry(&self, observation: &Observation) {
        self.telemetry.lock().unwrap().push(observation.clone());
    }

    fn on_failure(&self, failure: &FailureReport) {
        self.failures.lock().unwrap().push(failure.clone());
    }

    fn on_corruption(&self, report: &CorruptionReport) {
        self.corruptions.lock().unwrap().push(report.clone());
    }
}

pub struct Harness {
    pub link: GroundLink,
    pub transmitter: Arc<RecordingTransmitter>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut LinkConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LinkConfig {
        logfile: dir.path().join("session_log.jsonl"),
        ..LinkConfig::default()
    };
    tweak(&mut config);

    let transmitter = Arc::new(RecordingTransmitter::default());
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::new());
    let link = GroundLink::with_clock(
        &config,
        Arc::clone(&transmitter) as Arc<dyn Transmitter>,
        Arc::clone(&sink) as Arc<dyn LinkSink>,
        Arc::clone(&clock) as Arc<dyn groundlink::handshake::Clock>,
    );

    Harness {
        link,
        transmitter,
        sink,
        clock,
        dir,
    }
}

pub fn line(source: Source, device: DeviceId, sensor: &str, value: &str) -> String {
    encode(&ParsedMessage {
        date: "01-01-2025".into(),
        time: "12-00-00.000".into(),
        source,
        device,
        sensor: sensor.into(),
        payload: Payload::classify(value),
    })
}

pub fn telemetry(device: DeviceId, sensor: &str, value: &str) -> String {
    line(Source::Telemetry, device, sensor, value)
}

pub fn log_record(device: DeviceId, sensor: &str, value: &str) -> String {
    line(Source::Log, device, sensor, value)
}

pub fn log_start() -> String {
    log_record(DeviceId::BlackBox, SYSTEM_SENSOR, LOG_START)
}

pub fn log_end() -> String {
    log_record(DeviceId::BlackBox, SYSTEM_SENSOR, LOG_END)
}

pub fn getlog(device: DeviceId) -> Command {
    Command::getlog(1, device, "temp")
}

pub fn datagram(message: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({"recv_time": 1.0, "message": message})).unwrap()
}
