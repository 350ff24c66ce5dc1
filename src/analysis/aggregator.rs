use chrono::{DateTime, Utc};

use crate::analysis::{AnalysisError, TestRun};
use crate::device::{round2, Device, Reading};

/// Reduce a completed reading sequence into a [`TestRun`].
///
/// The verdict uses the device's current threshold bounds. The end time is the
/// timestamp of the last reading.
pub fn analyze(
    readings: Vec<Reading>,
    device: &Device,
    started_at: DateTime<Utc>,
) -> Result<TestRun, AnalysisError> {
    let Some(last) = readings.last() else {
        return Err(AnalysisError::EmptyInput);
    };
    let ended_at = last.timestamp;

    let (min_threshold, max_threshold) = (device.min_threshold(), device.max_threshold());

    let mut sum = 0.0;
    let mut min_value = f64::INFINITY;
    let mut max_value = f64::NEG_INFINITY;
    let mut passed = true;

    for r in &readings {
        sum += r.value;
        min_value = min_value.min(r.value);
        max_value = max_value.max(r.value);
        if r.value < min_threshold || r.value > max_threshold {
            passed = false;
        }
    }

    let sample_count = readings.len();

    Ok(TestRun {
        started_at,
        ended_at,
        device_id: device.id().to_string(),
        device_type: device.kind(),
        sample_count,
        average_value: round2(sum / sample_count as f64),
        max_value,
        min_value,
        min_threshold,
        max_threshold,
        passed,
        readings,
    })
}
