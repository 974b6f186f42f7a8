use crate::devices::DeviceId;
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GETLOG: &str = "getlog";
pub const GETSTATS: &str = "getstats";
const QUIT: &str = "quit";

/// Outbound request for the remote device.
///
/// Known fields are typed; anything else the issuer supplies is kept in
/// `extra` and sent along unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Command {
    pub fn getlog(interval: u64, device: DeviceId, sensor: impl Into<String>) -> Self {
        Self {
            command: GETLOG.to_string(),
            interval: Some(interval),
            device: Some(device),
            sensor: Some(sensor.into()),
            extra: Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_getlog(&self) -> bool {
        self.command == GETLOG
    }
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetLog(Command),
    GetStats(DeviceId),
    Quit,
}

impl Request {
    /// Parses an operator line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed == QUIT {
            return Ok(Some(Request::Quit));
        }

        let command: Command = serde_json::from_str(trimmed)?;
        match command.command.as_str() {
            GETLOG => Ok(Some(Request::GetLog(command))),
            GETSTATS => command
                .device
                .map(|device| Some(Request::GetStats(device)))
                .ok_or_else(|| LinkError::InvalidRequest("getstats requires a device".into())),
            other => Err(LinkError::InvalidRequest(format!("unknown command {other:?}"))),
        }
    }
}
