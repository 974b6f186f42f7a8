use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEVICE_COUNT: usize = 7;

/// Onboard subsystems that can appear in telemetry or log lines.
///
/// The discriminant is the device identifier carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
pub enum DeviceId {
    BlackBox = 0,
    EmergencySystem = 1,
    OxygenSystem = 2,
    Climatic = 3,
    RadiationShield = 4,
    PressureSystem = 5,
    Lighting = 6,
}

impl DeviceId {
    pub const ALL: [DeviceId; DEVICE_COUNT] = [
        DeviceId::BlackBox,
        DeviceId::EmergencySystem,
        DeviceId::OxygenSystem,
        DeviceId::Climatic,
        DeviceId::RadiationShield,
        DeviceId::PressureSystem,
        DeviceId::Lighting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceId::BlackBox => "BlackBox",
            DeviceId::EmergencySystem => "EmergencySystem",
            DeviceId::OxygenSystem => "OxygenSystem",
            DeviceId::Climatic => "Climatic",
            DeviceId::RadiationShield => "RadiationShield",
            DeviceId::PressureSystem => "PressureSystem",
            DeviceId::Lighting => "Lighting",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Looks up a raw identifier in the registry. Anything outside 0..=6 is unknown.
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw).ok().and_then(|idx| Self::ALL.get(idx).copied())
    }
}

impl From<DeviceId> for u8 {
    fn from(id: DeviceId) -> u8 {
        id.as_u8()
    }
}

impl TryFrom<i64> for DeviceId {
    type Error = UnknownDevice;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        DeviceId::from_raw(raw).ok_or(UnknownDevice(raw))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown device id {0}")]
pub struct UnknownDevice(pub i64);
