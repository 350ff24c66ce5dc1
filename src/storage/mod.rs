//! JSON result files -- save, load, and merged history.

pub mod history;

pub use history::{list_results, load_many};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::analysis::TestRun;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("result file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid result file {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write a test run as pretty-printed JSON, creating the parent directory if needed.
pub fn save(run: &TestRun, path: &Path) -> Result<(), StorageError> {
    let result = write_json(run, path);
    match &result {
        Ok(()) => info!(path = %path.display(), device = run.device_id.as_str(), "test result saved"),
        Err(e) => error!(path = %path.display(), error = %e, "failed to save test result"),
    }
    result
}

fn write_json(run: &TestRun, path: &Path) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(run).map_err(|source| StorageError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, json).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a test run back from a JSON file.
pub fn load(path: &Path) -> Result<TestRun, StorageError> {
    let result = read_json(path);
    match &result {
        Ok(run) => info!(path = %path.display(), samples = run.sample_count, "test result loaded"),
        Err(e) => error!(path = %path.display(), error = %e, "failed to load test result"),
    }
    result
}

fn read_json(path: &Path) -> Result<TestRun, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| StorageError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Default file name for a result, e.g. `TestResult_DEV-1_20240131093015.json`.
pub fn default_file_name(run: &TestRun) -> String {
    let id: String = run
        .device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stamp = run.started_at.with_timezone(&chrono::Local).format("%Y%m%d%H%M%S");
    format!("TestResult_{}_{}.json", id, stamp)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::{DeviceKind, Reading};
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn sample_run(device_id: &str, start_secs: i64, values: &[f64]) -> TestRun {
        // Sub-second component exercises timestamp precision on round-trip.
        let start = Utc.timestamp_opt(start_secs, 123_456_789).unwrap();
        let readings: Vec<Reading> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| Reading {
                device_id: device_id.to_string(),
                device_type: DeviceKind::Pressure,
                timestamp: start + Duration::nanoseconds(i as i64 * 1_000_000_007),
                value,
                unit: "kPa".to_string(),
            })
            .collect();
        TestRun {
            started_at: start,
            ended_at: readings.last().map(|r| r.timestamp).unwrap_or(start),
            device_id: device_id.to_string(),
            device_type: DeviceKind::Pressure,
            sample_count: readings.len(),
            average_value: 100.5,
            max_value: 101.0,
            min_value: 100.0,
            min_threshold: 95.0,
            max_threshold: 105.0,
            passed: true,
            readings,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.json");
        let run = sample_run("P-1", 1_700_000_000, &[100.0, 101.0, 100.5]);

        save(&run, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, run);
        assert_eq!(loaded.readings[2].timestamp, run.readings[2].timestamp);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
        assert!(err.to_string().contains("corrupt.json"));
    }

    #[test]
    fn test_default_file_name_sanitizes_id() {
        let run = sample_run("bench/3 a", 1_700_000_000, &[100.0]);
        let name = default_file_name(&run);
        assert!(name.starts_with("TestResult_bench_3_a_"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains('/'));
    }
}
