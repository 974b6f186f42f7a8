use crate::devices::DeviceId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const MAX_DATAGRAM_SIZE: usize = 4096;
pub const MIN_FIELDS: usize = 7;

pub const SYSTEM_SENSOR: &str = "system";
pub const LOG_START: &str = "log_start";
pub const LOG_END: &str = "log_end";

const TELEMETRY_TAG: &str = "online";
const LOG_TAG: &str = "log";
const FAILURE_PREFIXES: [&str; 2] = ["WARNING", "ERROR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Telemetry,
    Log,
}

impl Source {
    /// Tag used in the third field of a raw line.
    pub fn tag(self) -> &'static str {
        match self {
            Source::Telemetry => TELEMETRY_TAG,
            Source::Log => LOG_TAG,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TELEMETRY_TAG => Some(Source::Telemetry),
            LOG_TAG => Some(Source::Log),
            _ => None,
        }
    }
}

/// Sensor reading carried in the value field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Value(String),
    Failure(String),
}

impl Payload {
    /// Failure when the text starts with `WARNING` or `ERROR`, plain value otherwise.
    pub fn classify(text: impl Into<String>) -> Self {
        let text = text.into();
        if FAILURE_PREFIXES.iter().any(|prefix| text.starts_with(prefix)) {
            Payload::Failure(text)
        } else {
            Payload::Value(text)
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Payload::Value(text) | Payload::Failure(text) => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Payload::Failure(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMarker {
    Start,
    End,
}

/// Routing view of a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind<'a> {
    Telemetry(&'a Payload),
    LogControl(LogMarker),
    LogData(&'a Payload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub date: String,
    pub time: String,
    pub source: Source,
    pub device: DeviceId,
    pub sensor: String,
    pub payload: Payload,
}

impl ParsedMessage {
    pub fn kind(&self) -> MessageKind<'_> {
        match self.source {
            Source::Telemetry => MessageKind::Telemetry(&self.payload),
            Source::Log => match (&self.payload, self.sensor.as_str()) {
                (Payload::Value(v), SYSTEM_SENSOR) if v == LOG_START => {
                    MessageKind::LogControl(LogMarker::Start)
                }
                (Payload::Value(v), SYSTEM_SENSOR) if v == LOG_END => {
                    MessageKind::LogControl(LogMarker::End)
                }
                _ => MessageKind::LogData(&self.payload),
            },
        }
    }

    /// Every field except the checksum, joined with single spaces.
    ///
    /// Whitespace runs inside the value collapse to one space, matching how
    /// `decode` rejoins value tokens.
    pub fn body(&self) -> String {
        let value = self.payload.text().split_whitespace().collect::<Vec<_>>().join(" ");
        format!(
            "{} {} {} {} {} {}",
            self.date,
            self.time,
            self.source.tag(),
            self.device.as_u8(),
            self.sensor,
            value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("unknown device id {0}")]
    UnknownDevice(i64),
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    Corrupted { declared: u64, computed: u64 },
}

impl DecodeError {
    /// Corruption is the only decode failure worth surfacing as a diagnostic.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DecodeError::Corrupted { .. })
    }
}

/// Sum of the ASCII byte values of `body`.
pub fn checksum(body: &str) -> u64 {
    body.bytes().map(u64::from).sum()
}

/// Appends the checksum to the message body.
///
/// Date, time and sensor must be single whitespace-free tokens and the value
/// must be non-empty, otherwise the line will not decode.
pub fn encode(message: &ParsedMessage) -> String {
    let body = message.body();
    let sum = checksum(&body);
    format!("{body} {sum}")
}

/// Validates a raw line and turns it into a [`ParsedMessage`].
///
/// Layout: `<date> <time> <online|log> <device> <sensor> <value...> <checksum>`.
/// Tokens between the sensor and the checksum form the value.
pub fn decode(raw: &str) -> Result<ParsedMessage, DecodeError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < MIN_FIELDS {
        return Err(DecodeError::Malformed(format!(
            "expected at least {MIN_FIELDS} fields, got {}",
            tokens.len()
        )));
    }

    let Some((checksum_token, fields)) = tokens.split_last() else {
        return Err(DecodeError::Malformed("empty line".into()));
    };

    let raw_device: i64 = fields[3]
        .parse()
        .map_err(|_| DecodeError::Malformed(format!("device id {:?} is not an integer", fields[3])))?;
    let declared: u64 = checksum_token
        .parse()
        .map_err(|_| DecodeError::Malformed(format!("checksum {checksum_token:?} is not an integer")))?;
    let device = DeviceId::from_raw(raw_device).ok_or(DecodeError::UnknownDevice(raw_device))?;

    let body = fields.join(" ");
    if !body.is_ascii() {
        return Err(DecodeError::Malformed("non-ASCII body".into()));
    }
    let computed = checksum(&body);
    if computed != declared {
        return Err(DecodeError::Corrupted { declared, computed });
    }

    let source = Source::from_tag(fields[2])
        .ok_or_else(|| DecodeError::Malformed(format!("unknown source tag {:?}", fields[2])))?;

    Ok(ParsedMessage {
        date: fields[0].to_string(),
        time: fields[1].to_string(),
        source,
        device,
        sensor: fields[4].to_string(),
        payload: Payload::classify(fields[5..].join(" ")),
    })
}

/// Transport envelope around a raw line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datagram {
    #[serde(rename = "recv_time", default)]
    pub receipt_time: f64,
    pub message: String,
}

impl Datagram {
    pub fn new(message: impl Into<String>) -> Self {
        let receipt_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            receipt_time,
            message: message.into(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_prefix_is_case_sensitive() {
        assert!(Payload::classify("WARNING_temp_high").is_failure());
        assert!(Payload::classify("ERROR_sensor_fail").is_failure());
        assert!(!Payload::classify("warning_lowercase").is_failure());
        assert!(!Payload::classify("42.0").is_failure());
    }

    #[test]
    fn checksum_counts_separators() {
        assert_eq!(checksum("a b"), 97 + 32 + 98);
        assert_eq!(checksum(""), 0);
    }

    #[test]
    fn datagram_uses_recv_time_key() {
        let dgram = Datagram::from_slice(br#"{"recv_time": 12.5, "message": "hello"}"#).unwrap();
        assert_eq!(dgram.receipt_time, 12.5);
        assert_eq!(dgram.message, "hello");

        let missing_time = Datagram::from_slice(br#"{"message": "x"}"#).unwrap();
        assert_eq!(missing_time.receipt_time, 0.0);
        assert!(Datagram::from_slice(br#"{"recv_time": 1}"#).is_err());
    }
}
