//! Simulated sensor devices.
//!
//! A device is a variant tag plus a small amount of mutable state (connection
//! flag, sampling interval, fluctuation range). All variant-specific behaviour
//! comes from the constant table in [`variant`]; connecting and sampling are the
//! same code for every kind, driven by a shared [`FailurePolicy`] and an
//! injected random source.

pub mod reading;
pub mod variant;

pub use reading::{round2, Reading};
pub use variant::{DeviceKind, UnknownDeviceKind, VariantSpec};

use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 1000;

/// Largest accepted fluctuation range. Keeps `base ± range` and its sums
/// comfortably finite.
pub const MAX_FLUCTUATION_RANGE: f64 = 1.0e12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("communication with device {0} interrupted")]
    CommunicationError(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Probabilities with which simulated operations fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    connect_failure_rate: f64,
    communication_failure_rate: f64,
}

impl FailurePolicy {
    pub fn new(connect_failure_rate: f64, communication_failure_rate: f64) -> Result<Self, DeviceError> {
        for (name, p) in [
            ("connect_failure_rate", connect_failure_rate),
            ("communication_failure_rate", communication_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(DeviceError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(Self {
            connect_failure_rate,
            communication_failure_rate,
        })
    }

    /// A policy under which nothing ever fails.
    pub fn reliable() -> Self {
        Self {
            connect_failure_rate: 0.0,
            communication_failure_rate: 0.0,
        }
    }

    pub fn connect_failure_rate(&self) -> f64 {
        self.connect_failure_rate
    }

    pub fn communication_failure_rate(&self) -> f64 {
        self.communication_failure_rate
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            connect_failure_rate: 0.10,
            communication_failure_rate: 0.05,
        }
    }
}

/// A simulated sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: String,
    kind: DeviceKind,
    connected: bool,
    sampling_interval_ms: u64,
    fluctuation_range: f64,
}

impl Device {
    pub fn new(kind: DeviceKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            connected: false,
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            fluctuation_range: kind.spec().default_fluctuation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn spec(&self) -> &'static VariantSpec {
        self.kind.spec()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn min_threshold(&self) -> f64 {
        self.spec().min_threshold
    }

    pub fn max_threshold(&self) -> f64 {
        self.spec().max_threshold
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn sampling_interval_ms(&self) -> u64 {
        self.sampling_interval_ms
    }

    pub fn set_sampling_interval_ms(&mut self, ms: u64) -> Result<(), DeviceError> {
        if ms == 0 {
            return Err(DeviceError::Configuration(
                "sampling interval must be a positive number of milliseconds".to_string(),
            ));
        }
        self.sampling_interval_ms = ms;
        Ok(())
    }

    pub fn fluctuation_range(&self) -> f64 {
        self.fluctuation_range
    }

    pub fn set_fluctuation_range(&mut self, range: f64) -> Result<(), DeviceError> {
        if !range.is_finite() || !(0.0..=MAX_FLUCTUATION_RANGE).contains(&range) {
            return Err(DeviceError::Configuration(format!(
                "fluctuation range must be between 0 and {:e}, got {}",
                MAX_FLUCTUATION_RANGE, range
            )));
        }
        self.fluctuation_range = range;
        Ok(())
    }

    /// Attempt to connect. A failed attempt is an expected outcome and is
    /// reported as `false`, leaving the device disconnected.
    pub fn connect<R: Rng>(&mut self, policy: &FailurePolicy, rng: &mut R) -> bool {
        if rng.gen_bool(policy.connect_failure_rate) {
            debug!(device = %self.id, kind = %self.kind, "simulated connect failure");
            return false;
        }
        self.connected = true;
        true
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Produce one reading: `base ± uniform(-1, 1) * fluctuation`, rounded to 2 decimals.
    pub fn collect_reading<R: Rng>(
        &self,
        policy: &FailurePolicy,
        rng: &mut R,
    ) -> Result<Reading, DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected(self.id.clone()));
        }
        if rng.gen_bool(policy.communication_failure_rate) {
            return Err(DeviceError::CommunicationError(self.id.clone()));
        }

        let spec = self.spec();
        let offset = (rng.gen::<f64>() * 2.0 - 1.0) * self.fluctuation_range;

        Ok(Reading {
            device_id: self.id.clone(),
            device_type: self.kind,
            timestamp: Utc::now(),
            value: round2(spec.base_value + offset),
            unit: spec.unit.to_string(),
        })
    }
}

/// Default identifier for a freshly created device, e.g. `DEV-20240131093015`.
pub fn default_device_id() -> String {
    format!("DEV-{}", chrono::Local::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn connected(kind: DeviceKind) -> Device {
        let mut device = Device::new(kind, "DEV-TEST");
        assert!(device.connect(&FailurePolicy::reliable(), &mut StdRng::seed_from_u64(1)));
        device
    }

    #[test]
    fn test_new_device_defaults() {
        let device = Device::new(DeviceKind::Pressure, "P-1");
        assert_eq!(device.id(), "P-1");
        assert!(!device.is_connected());
        assert_eq!(device.sampling_interval(), Duration::from_millis(1000));
        assert_eq!(device.fluctuation_range(), 5.0);
    }

    #[test]
    fn test_collect_while_disconnected_fails() {
        let mut rng = StdRng::seed_from_u64(7);
        for kind in DeviceKind::ALL {
            let device = Device::new(kind, "DEV-OFF");
            for _ in 0..50 {
                let err = device
                    .collect_reading(&FailurePolicy::reliable(), &mut rng)
                    .unwrap_err();
                assert_eq!(err, DeviceError::NotConnected("DEV-OFF".to_string()));
            }
        }
    }

    #[test]
    fn test_connect_failure_leaves_device_disconnected() {
        let always_fail = FailurePolicy::new(1.0, 0.0).unwrap();
        let mut device = Device::new(DeviceKind::Temperature, "DEV-1");
        let mut rng = StdRng::seed_from_u64(3);
        assert!(!device.connect(&always_fail, &mut rng));
        assert!(!device.is_connected());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut device = connected(DeviceKind::Temperature);
        device.disconnect();
        device.disconnect();
        assert!(!device.is_connected());
    }

    #[test]
    fn test_readings_stay_within_fluctuation_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for kind in DeviceKind::ALL {
            let device = connected(kind);
            let spec = kind.spec();
            let lo = spec.base_value - device.fluctuation_range();
            let hi = spec.base_value + device.fluctuation_range();
            for _ in 0..500 {
                let r = device
                    .collect_reading(&FailurePolicy::reliable(), &mut rng)
                    .unwrap();
                assert!(r.value >= lo && r.value <= hi, "{} outside [{}, {}]", r.value, lo, hi);
                assert!((r.value * 100.0 - (r.value * 100.0).round()).abs() < 1e-6);
                assert_eq!(r.unit, spec.unit);
                assert_eq!(r.device_type, kind);
            }
        }
    }

    #[test]
    fn test_zero_fluctuation_yields_base_value() {
        let mut device = connected(DeviceKind::Temperature);
        device.set_fluctuation_range(0.0).unwrap();
        let r = device
            .collect_reading(&FailurePolicy::reliable(), &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(r.value, 25.0);
    }

    #[test]
    fn test_communication_failure() {
        let device = connected(DeviceKind::Pressure);
        let flaky = FailurePolicy::new(0.0, 1.0).unwrap();
        let err = device
            .collect_reading(&flaky, &mut StdRng::seed_from_u64(5))
            .unwrap_err();
        assert!(matches!(err, DeviceError::CommunicationError(_)));
    }

    #[test]
    fn test_configuration_validation() {
        let mut device = Device::new(DeviceKind::Temperature, "DEV-1");
        assert!(device.set_sampling_interval_ms(0).is_err());
        assert!(device.set_sampling_interval_ms(250).is_ok());
        assert_eq!(device.sampling_interval_ms(), 250);
        assert!(device.set_fluctuation_range(-1.0).is_err());
        assert!(device.set_fluctuation_range(f64::NAN).is_err());
        assert!(device.set_fluctuation_range(1e308).is_err());
        assert!(device.set_fluctuation_range(MAX_FLUCTUATION_RANGE).is_ok());
        assert!(FailurePolicy::new(1.5, 0.0).is_err());
        assert!(FailurePolicy::new(0.1, -0.1).is_err());
    }

    #[test]
    fn test_widest_fluctuation_stays_finite() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut device = Device::new(DeviceKind::Pressure, "P-WIDE");
        device.set_fluctuation_range(MAX_FLUCTUATION_RANGE).unwrap();
        assert!(device.connect(&FailurePolicy::reliable(), &mut rng));

        let readings: Vec<Reading> = (0..20)
            .map(|_| device.collect_reading(&FailurePolicy::reliable(), &mut rng).unwrap())
            .collect();
        let base = DeviceKind::Pressure.spec().base_value;
        for r in &readings {
            assert!(r.value.is_finite());
            assert!((r.value - base).abs() <= MAX_FLUCTUATION_RANGE);
        }

        let run = crate::analysis::analyze(readings, &device, chrono::Utc::now()).unwrap();
        assert!(run.average_value.is_finite());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.json");
        crate::storage::save(&run, &path).unwrap();
        assert_eq!(crate::storage::load(&path).unwrap(), run);
    }

    #[test]
    fn test_default_device_id_format() {
        let id = default_device_id();
        assert!(id.starts_with("DEV-"));
        assert_eq!(id.len(), "DEV-".len() + 14);
    }
}
