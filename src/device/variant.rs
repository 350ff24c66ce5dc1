//! Device variants and their constant parameters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Constant facts that distinguish one device variant from another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantSpec {
    pub base_value: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub unit: &'static str,
    pub default_fluctuation: f64,
}

const TEMPERATURE: VariantSpec = VariantSpec {
    base_value: 25.0,
    min_threshold: 24.0,
    max_threshold: 26.0,
    unit: "°C",
    default_fluctuation: 3.0,
};

const PRESSURE: VariantSpec = VariantSpec {
    base_value: 100.0,
    min_threshold: 95.0,
    max_threshold: 105.0,
    unit: "kPa",
    default_fluctuation: 5.0,
};

/// Supported simulated sensor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Temperature,
    Pressure,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Temperature, DeviceKind::Pressure];

    pub fn spec(self) -> &'static VariantSpec {
        match self {
            DeviceKind::Temperature => &TEMPERATURE,
            DeviceKind::Pressure => &PRESSURE,
        }
    }

    /// Human-facing label, e.g. for listing in the CLI.
    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::Temperature => "Temperature sensor",
            DeviceKind::Pressure => "Pressure sensor",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Temperature => write!(f, "temperature"),
            DeviceKind::Pressure => write!(f, "pressure"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unsupported device type: {0} (expected one of: temperature, pressure)")]
pub struct UnknownDeviceKind(pub String);

impl FromStr for DeviceKind {
    type Err = UnknownDeviceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(DeviceKind::Temperature),
            "pressure" | "press" => Ok(DeviceKind::Pressure),
            _ => Err(UnknownDeviceKind(s.to_string())),
        }
    }
}
