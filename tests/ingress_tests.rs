mod common;

use common::*;
use groundlink::codec::{LogMarker, Payload};
use groundlink::devices::DeviceId;
use groundlink::ingress::{FailureReport, Ingested, Observation};
use groundlink::{FailureStats, LinkError, LinkPhase};
use serde_json::json;

#[test]
fn test_telemetry_forwarded_not_persisted() {
    let h = harness();
    let result = h.link.handle_line(&telemetry(DeviceId::OxygenSystem, "temp", "3.14")).unwrap();
    assert_eq!(result, Ingested::Telemetry);

    let seen = h.sink.telemetry.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![Observation {
            device: DeviceId::OxygenSystem,
            sensor: "temp".into(),
            reading: Payload::Value("3.14".into()),
        }]
    );
    assert!(h.link.store().entries().unwrap().is_empty());
    assert_eq!(h.link.phase(), LinkPhase::Idle);
}

#[test]
fn test_observation_serializes_flat() {
    let value = Observation {
        device: DeviceId::OxygenSystem,
        sensor: "temp".into(),
        reading: Payload::Value("42.0".into()),
    };
    assert_eq!(serde_json::to_value(&value).unwrap(), json!({"device": 2, "sensor": "temp", "value": "42.0"}));

    let failure = Observation {
        device: DeviceId::Lighting,
        sensor: "lamp".into(),
        reading: Payload::Failure("ERROR_bulb".into()),
    };
    assert_eq!(serde_json::to_value(&failure).unwrap(), json!({"device": 6, "sensor": "lamp", "failure": "ERROR_bulb"}));
}

#[test]
fn test_telemetry_failure_goes_to_telemetry_channel() {
    let h = harness();
    h.link.handle_line(&telemetry(DeviceId::Climatic, "temp", "WARNING_hot")).unwrap();

    let seen = h.sink.telemetry.lock().unwrap().clone();
    assert_eq!(seen[0].reading, Payload::Failure("WARNING_hot".into()));
    assert!(h.sink.failures.lock().unwrap().is_empty());
}

#[test]
fn test_log_failure_reported() {
    let h = harness();
    let result = h.link.handle_line(&log_record(DeviceId::Climatic, "sensor2", "ERROR_sensor_fail")).unwrap();
    assert_eq!(result, Ingested::LogFailure);

    let failures = h.sink.failures.lock().unwrap().clone();
    assert_eq!(
        failures,
        vec![FailureReport {
            device: DeviceId::Climatic,
            sensor: "sensor2".into(),
            failure: "ERROR_sensor_fail".into(),
        }]
    );
    assert!(h.sink.telemetry.lock().unwrap().is_empty());
    // Persistence is off by default.
    assert!(h.link.store().entries().unwrap().is_empty());
}

#[test]
fn test_log_value_is_not_forwarded() {
    let h = harness();
    let result = h.link.handle_line(&log_record(DeviceId::Climatic, "sensor2", "33.3")).unwrap();
    assert_eq!(result, Ingested::LogValue);
    assert!(h.sink.telemetry.lock().unwrap().is_empty());
    assert!(h.sink.failures.lock().unwrap().is_empty());
}

#[test]
fn test_log_markers_drive_handshake() {
    let h = harness();
    let start = h.link.handle_line(&log_start()).unwrap();
    assert_eq!(start, Ingested::LogControl { marker: LogMarker::Start, pump: None });
    assert_eq!(h.link.phase(), LinkPhase::Awaiting);

    let end = h.link.handle_line(&log_end()).unwrap();
    assert!(matches!(end, Ingested::LogControl { marker: LogMarker::End, pump: Some(_) }));
    assert_eq!(h.link.phase(), LinkPhase::Idle);
}

#[test]
fn test_corrupted_line_surfaced_as_diagnostic() {
    let h = harness();
    let result = h.link.handle_line("01-01-2025 12-00-00.000 online 2 temp 100 99999").unwrap();
    assert_eq!(result, Ingested::Corrupted);

    let reports = h.sink.corruptions.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].declared, 99999);
    assert!(h.sink.telemetry.lock().unwrap().is_empty());
    assert_eq!(h.link.stats().ingress.corrupted, 1);
}

#[test]
fn test_malformed_and_unknown_device_dropped_silently() {
    let h = harness();
    assert_eq!(h.link.handle_line("garbage").unwrap(), Ingested::Malformed);
    assert_eq!(h.link.handle_line(&telemetry(DeviceId::OxygenSystem, "temp", "1").replace(" 2 ", " 9 ")).unwrap(), Ingested::Malformed);

    assert!(h.sink.corruptions.lock().unwrap().is_empty());
    assert!(h.sink.telemetry.lock().unwrap().is_empty());
    assert_eq!(h.link.stats().ingress.malformed, 2);
}

#[test]
fn test_corrupted_log_end_does_not_release_queue() {
    let h = harness();
    h.link.submit(getlog(DeviceId::OxygenSystem)).unwrap();
    h.link.submit(getlog(DeviceId::Climatic)).unwrap();

    let damaged = log_end().replace("log_end", "log_enD");
    assert_eq!(h.link.handle_line(&damaged).unwrap(), Ingested::Corrupted);
    assert_eq!(h.transmitter.count(), 1);
    assert_eq!(h.link.phase(), LinkPhase::Awaiting);
}

#[test]
fn test_ingress_survives_bad_input_sequence() {
    let h = harness();
    let lines = [
        "".to_string(),
        "01-01-2025".to_string(),
        "01-01-2025 12-00-00.000 online x temp 1 2".to_string(),
        "01-01-2025 12-00-00.000 online 2 temp 100 99999".to_string(),
        telemetry(DeviceId::Lighting, "lux", "300"),
    ];
    for line in &lines {
        h.link.handle_line(line).unwrap();
    }
    assert_eq!(h.sink.telemetry.lock().unwrap().len(), 1);

    let stats = h.link.stats();
    assert_eq!(stats.ingress.lines, 5);
    assert_eq!(stats.ingress.telemetry, 1);
    assert_eq!(stats.ingress.malformed, 3);
    assert_eq!(stats.ingress.corrupted, 1);
}

#[test]
fn test_failure_persistence_feeds_stats() {
    let h = harness_with(|config| config.persist_failures = true);
    h.link.handle_line(&log_start()).unwrap();
    h.link.handle_line(&log_record(DeviceId::OxygenSystem, "sensor1", "WARNING_temp_high")).unwrap();
    h.link.handle_line(&log_record(DeviceId::OxygenSystem, "sensor3", "ERROR_sensor_fail")).unwrap();
    h.link.handle_line(&log_record(DeviceId::Climatic, "sensor1", "WARNING_temp_high")).unwrap();
    h.link.handle_line(&log_record(DeviceId::OxygenSystem, "sensor1", "25.0")).unwrap();
    h.link.handle_line(&log_end()).unwrap();

    assert_eq!(h.link.query_stats(DeviceId::OxygenSystem).unwrap(), FailureStats { warnings: 1, errors: 1 });
    assert_eq!(h.link.query_stats(DeviceId::Climatic).unwrap(), FailureStats { warnings: 1, errors: 0 });
    assert_eq!(
        h.link.store().entries().unwrap()[0],
        json!({"device": 2, "sensor": "sensor1", "failure": "WARNING_temp_high"})
    );
}

#[test]
fn test_stats_without_persistence_see_only_commands() {
    let h = harness();
    h.link.handle_line(&log_record(DeviceId::OxygenSystem, "sensor1", "WARNING_temp_high")).unwrap();
    h.link.submit(getlog(DeviceId::OxygenSystem)).unwrap();
    assert_eq!(h.link.query_stats(DeviceId::OxygenSystem).unwrap(), FailureStats::default());
}

#[test]
fn test_persist_failure_error_is_returned() {
    let h = harness_with(|config| {
        config.persist_failures = true;
        config.logfile = std::env::temp_dir();
    });
    let err = h
        .link
        .handle_line(&log_record(DeviceId::OxygenSystem, "sensor1", "ERROR_x"))
        .unwrap_err();
    assert!(matches!(err, LinkError::Store(_)));
    // The sink still heard about it.
    assert_eq!(h.sink.failures.lock().unwrap().len(), 1);
}
