//! Workbench session: the current device, the last result, and the guards that
//! decide which operation is allowed when.
//!
//! While a run is active the device lives on the engine worker inside the
//! sample source, so "testing" is simply the absence of an attached device
//! plus an outstanding [`RunHandle`].

use std::num::NonZeroUsize;
use std::path::Path;

use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::TestRun;
use crate::device::{Device, DeviceError, DeviceKind, FailurePolicy, Reading};
use crate::engine::{self, FinishedRun, RunHandle, RunOutcome, RunState, SimulatedSource};
use crate::storage::{self, StorageError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a device is already attached; disconnect it first")]
    DeviceAttached,

    #[error("no device attached; connect a device first")]
    NoDevice,

    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("a test is in progress")]
    TestInProgress,

    #[error("no test is in progress")]
    NoTestInProgress,

    #[error("no test result to save")]
    NoResult,

    #[error("device identifier must not be empty")]
    EmptyDeviceId,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("test-run worker failed: {0}")]
    Worker(String),
}

/// Session state for one operator at one bench.
pub struct Workbench<R> {
    policy: FailurePolicy,
    rng: Option<R>,
    device: Option<Device>,
    run: Option<RunHandle<SimulatedSource<R>>>,
    last_result: Option<TestRun>,
}

impl<R> Workbench<R>
where
    R: Rng + SeedableRng + Send + 'static,
{
    pub fn new(policy: FailurePolicy, rng: R) -> Self {
        Self {
            policy,
            rng: Some(rng),
            device: None,
            run: None,
            last_result: None,
        }
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn last_result(&self) -> Option<&TestRun> {
        self.last_result.as_ref()
    }

    pub fn state(&self) -> RunState {
        if self.run.is_some() {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn is_testing(&self) -> bool {
        self.run.is_some()
    }

    /// Create a device of `kind` and try to connect it.
    ///
    /// `Ok(false)` means the attempt failed; no device stays attached and the
    /// operator may simply retry.
    pub fn connect(&mut self, kind: DeviceKind, id: &str) -> Result<bool, SessionError> {
        if self.is_testing() {
            return Err(SessionError::TestInProgress);
        }
        if self.device.is_some() {
            return Err(SessionError::DeviceAttached);
        }
        if id.trim().is_empty() {
            return Err(SessionError::EmptyDeviceId);
        }

        let rng = self.rng.as_mut().ok_or(SessionError::TestInProgress)?;
        let mut device = Device::new(kind, id.trim());
        if device.connect(&self.policy, rng) {
            info!(device = device.id(), kind = %kind, "device connected");
            self.device = Some(device);
            Ok(true)
        } else {
            error!(device = device.id(), kind = %kind, "device connection failed");
            Ok(false)
        }
    }

    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.is_testing() {
            return Err(SessionError::TestInProgress);
        }
        let mut device = self.device.take().ok_or(SessionError::NoDevice)?;
        device.disconnect();
        info!(device = device.id(), "device disconnected");
        Ok(())
    }

    /// Change the attached device's sampling interval and fluctuation range.
    pub fn configure(&mut self, interval_ms: Option<u64>, fluctuation: Option<f64>) -> Result<(), SessionError> {
        if self.is_testing() {
            return Err(SessionError::TestInProgress);
        }
        let device = self.device.as_mut().ok_or(SessionError::NoDevice)?;
        if let Some(ms) = interval_ms {
            device.set_sampling_interval_ms(ms)?;
        }
        if let Some(range) = fluctuation {
            device.set_fluctuation_range(range)?;
        }
        info!(
            device = device.id(),
            interval_ms = device.sampling_interval_ms(),
            fluctuation = device.fluctuation_range(),
            "device configuration updated"
        );
        Ok(())
    }

    /// Start a run on the attached device. The previous result is cleared.
    pub fn start_test<F>(&mut self, sample_count: NonZeroUsize, on_sample: F) -> Result<CancellationToken, SessionError>
    where
        F: FnMut(&Reading, usize) + Send + 'static,
    {
        if self.is_testing() {
            return Err(SessionError::TestInProgress);
        }
        let device = match self.device.take() {
            None => return Err(SessionError::NoDevice),
            Some(d) if !d.is_connected() => {
                let id = d.id().to_string();
                self.device = Some(d);
                return Err(SessionError::NotConnected(id));
            }
            Some(d) => d,
        };
        let Some(rng) = self.rng.take() else {
            self.device = Some(device);
            return Err(SessionError::TestInProgress);
        };

        info!(device = device.id(), samples = sample_count.get(), "starting test");
        self.last_result = None;

        let cancel = CancellationToken::new();
        let source = SimulatedSource::new(device, self.policy, rng);
        self.run = Some(engine::spawn(source, sample_count, on_sample, cancel.clone()));
        Ok(cancel)
    }

    /// Request the active run to stop. Idempotent while a run is active.
    pub fn stop_test(&self) -> Result<(), SessionError> {
        let run = self.run.as_ref().ok_or(SessionError::NoTestInProgress)?;
        run.cancel();
        info!("test stop requested");
        Ok(())
    }

    /// Wait for the active run, take the device back and keep the result.
    ///
    /// If the worker died, its device is lost with it. The bench is left idle
    /// with a freshly seeded random source so a new device can be connected.
    pub async fn finish_test(&mut self) -> Result<RunOutcome, SessionError> {
        let run = self.run.take().ok_or(SessionError::NoTestInProgress)?;
        let FinishedRun { source, outcome } = match run.join().await {
            Ok(finished) => finished,
            Err(e) => {
                error!(error = %format!("{:#}", e), "test-run worker lost, device detached");
                self.rng = Some(R::from_entropy());
                return Err(SessionError::Worker(format!("{:#}", e)));
            }
        };

        let (device, rng) = source.into_parts();
        self.device = Some(device);
        self.rng = Some(rng);

        match &outcome {
            RunOutcome::Completed(result) => {
                info!(verdict = result.verdict_label(), "{}", outcome.status_message());
                self.last_result = Some(result.clone());
            }
            RunOutcome::Cancelled { .. } => info!("{}", outcome.status_message()),
            RunOutcome::Failed { .. } => warn!("{}", outcome.status_message()),
        }

        Ok(outcome)
    }

    /// Persist the last completed result.
    pub fn save_result(&self, path: &Path) -> Result<(), SessionError> {
        if self.is_testing() {
            return Err(SessionError::TestInProgress);
        }
        let result = self.last_result.as_ref().ok_or(SessionError::NoResult)?;
        storage::save(result, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bench() -> Workbench<StdRng> {
        Workbench::new(FailurePolicy::reliable(), StdRng::seed_from_u64(21))
    }

    fn count(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_connect_guards() {
        let mut bench = bench();
        assert!(matches!(bench.connect(DeviceKind::Temperature, "  "), Err(SessionError::EmptyDeviceId)));
        assert!(bench.connect(DeviceKind::Temperature, "DEV-1").unwrap());
        assert!(matches!(bench.connect(DeviceKind::Pressure, "DEV-2"), Err(SessionError::DeviceAttached)));

        bench.disconnect().unwrap();
        assert!(bench.device().is_none());
        assert!(matches!(bench.disconnect(), Err(SessionError::NoDevice)));
    }

    #[test]
    fn test_failed_connect_attaches_nothing() {
        let policy = FailurePolicy::new(1.0, 0.0).unwrap();
        let mut bench = Workbench::new(policy, StdRng::seed_from_u64(1));
        assert!(!bench.connect(DeviceKind::Pressure, "P-1").unwrap());
        assert!(bench.device().is_none());
    }

    #[test]
    fn test_start_requires_device() {
        let mut bench = bench();
        let err = bench.start_test(count(5), |_: &Reading, _| {}).unwrap_err();
        assert!(matches!(err, SessionError::NoDevice));
    }

    #[test]
    fn test_save_requires_result() {
        let bench = bench();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            bench.save_result(&dir.path().join("r.json")),
            Err(SessionError::NoResult)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session() {
        let mut bench = bench();
        assert!(bench.connect(DeviceKind::Temperature, "DEV-9").unwrap());
        bench.configure(Some(200), Some(0.5)).unwrap();

        bench.start_test(count(5), |_: &Reading, _| {}).unwrap();
        assert_eq!(bench.state(), RunState::Running);
        assert!(matches!(bench.connect(DeviceKind::Pressure, "X"), Err(SessionError::TestInProgress)));
        assert!(matches!(bench.disconnect(), Err(SessionError::TestInProgress)));
        assert!(matches!(bench.configure(Some(10), None), Err(SessionError::TestInProgress)));
        assert!(matches!(
            bench.start_test(count(5), |_: &Reading, _| {}),
            Err(SessionError::TestInProgress)
        ));

        let outcome = bench.finish_test().await.unwrap();
        assert_eq!(outcome.state(), RunState::Completed);
        assert_eq!(bench.state(), RunState::Idle);

        // Fluctuation 0.5 around 25 stays inside [24, 26].
        let result = bench.last_result().unwrap();
        assert!(result.passed);
        assert_eq!(result.sample_count, 5);

        let device = bench.device().unwrap();
        assert_eq!(device.id(), "DEV-9");
        assert_eq!(device.sampling_interval_ms(), 200);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        bench.save_result(&path).unwrap();
        assert_eq!(&storage::load(&path).unwrap(), result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_partial_result() {
        let mut bench = bench();
        assert!(bench.connect(DeviceKind::Pressure, "P-3").unwrap());
        bench.start_test(count(20), |_: &Reading, _| {}).unwrap();
        bench.stop_test().unwrap();
        bench.stop_test().unwrap();

        let outcome = bench.finish_test().await.unwrap();
        assert_eq!(outcome.state(), RunState::Cancelled);
        assert!(outcome.readings_collected() < 20);
        assert!(bench.last_result().is_none());
        assert!(bench.device().is_some());
        assert!(matches!(bench.stop_test(), Err(SessionError::NoTestInProgress)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_worker_leaves_bench_usable() {
        let mut bench = bench();
        assert!(bench.connect(DeviceKind::Temperature, "DEV-LOST").unwrap());
        bench
            .start_test(count(5), |_: &Reading, i| {
                if i == 1 {
                    panic!("sample callback failed");
                }
            })
            .unwrap();

        let err = bench.finish_test().await.unwrap_err();
        assert!(matches!(err, SessionError::Worker(_)));
        assert!(!bench.is_testing());
        assert!(bench.device().is_none());

        assert!(bench.connect(DeviceKind::Pressure, "P-NEXT").unwrap());
        assert_eq!(bench.device().map(|d| d.id()), Some("P-NEXT"));
    }
}
