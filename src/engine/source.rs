//! Where the engine gets its readings from.

use rand::Rng;

use crate::device::{Device, DeviceError, FailurePolicy, Reading};

/// Something the test-run engine can poll for readings.
///
/// `collect_reading` is synchronous; the engine's only suspension point is the
/// wait between samples.
pub trait SampleSource {
    /// The device being sampled. Its interval paces the run and its thresholds
    /// judge the result.
    fn device(&self) -> &Device;

    fn collect_reading(&mut self) -> Result<Reading, DeviceError>;
}

/// A simulated device together with the failure policy and random source that
/// drive it for the duration of a run.
#[derive(Debug)]
pub struct SimulatedSource<R> {
    device: Device,
    policy: FailurePolicy,
    rng: R,
}

impl<R: Rng> SimulatedSource<R> {
    pub fn new(device: Device, policy: FailurePolicy, rng: R) -> Self {
        Self { device, policy, rng }
    }

    /// Hand the device back once the run is over.
    pub fn into_parts(self) -> (Device, R) {
        (self.device, self.rng)
    }
}

impl<R: Rng> SampleSource for SimulatedSource<R> {
    fn device(&self) -> &Device {
        &self.device
    }

    fn collect_reading(&mut self) -> Result<Reading, DeviceError> {
        self.device.collect_reading(&self.policy, &mut self.rng)
    }
}
