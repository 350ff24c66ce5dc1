use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceKind, Reading};

/// Aggregated verdict over a completed sequence of readings.
///
/// Field names on the wire match the result files written by earlier versions
/// of the tool, so old results keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestRun {
    #[serde(rename = "TestStartTime")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "TestEndTime")]
    pub ended_at: DateTime<Utc>,
    pub device_id: String,
    pub device_type: DeviceKind,
    pub sample_count: usize,
    pub average_value: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
    #[serde(rename = "IsPassed")]
    pub passed: bool,
    #[serde(rename = "MeasurementDataList", default)]
    pub readings: Vec<Reading>,
}

impl TestRun {
    pub fn verdict_label(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }

    pub fn unit(&self) -> &str {
        self.readings
            .first()
            .map(|r| r.unit.as_str())
            .unwrap_or_else(|| self.device_type.spec().unit)
    }

    /// Readings that fell outside the acceptance band.
    pub fn out_of_band(&self) -> impl Iterator<Item = (usize, &Reading)> {
        self.readings
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.value < self.min_threshold || r.value > self.max_threshold)
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} {}: {} ({} sample{}, avg {:.2} {unit}, min {:.2}, max {:.2}, limits [{:.2}, {:.2}])",
            self.device_type,
            self.device_id,
            self.verdict_label(),
            self.sample_count,
            if self.sample_count == 1 { "" } else { "s" },
            self.average_value,
            self.min_value,
            self.max_value,
            self.min_threshold,
            self.max_threshold,
            unit = self.unit(),
        );

        let outliers = self.out_of_band().count();
        if outliers > 0 {
            summary.push_str(&format!(", {} out of band", outliers));
        }

        summary
    }
}
