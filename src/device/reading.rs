use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceKind;

/// One timestamped sample produced by a connected device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reading {
    pub device_id: String,
    pub device_type: DeviceKind,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

/// Round to two decimal places, the resolution every reading and average is stored at.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if scaled.is_finite() {
        scaled.round() / 100.0
    } else {
        value
    }
}
