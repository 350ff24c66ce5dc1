//! Test-run engine: drives a fixed number of time-paced samples against a
//! connected device, cancellable at any point, and resolves the run into a
//! [`RunOutcome`].
//!
//! [`run`] is the loop itself. [`spawn`] moves it onto a background task and
//! returns a [`RunHandle`] for cancelling and collecting the result; the sample
//! source travels with the task and comes back in [`FinishedRun`].

pub mod sampler;
pub mod source;

pub use sampler::run;
pub use source::{SampleSource, SimulatedSource};

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisError, TestRun};
use crate::device::{DeviceError, Reading};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Lifecycle of a single test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every scheduled sample was taken and analyzed.
    Completed(TestRun),
    /// Stopped by the caller. The readings taken so far are a partial,
    /// non-authoritative result; no verdict is produced for them.
    Cancelled { readings: Vec<Reading> },
    /// A sample could not be collected. The run is not retried.
    Failed { error: RunError, readings: Vec<Reading> },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Completed(_) => RunState::Completed,
            RunOutcome::Cancelled { .. } => RunState::Cancelled,
            RunOutcome::Failed { .. } => RunState::Failed,
        }
    }

    pub fn readings(&self) -> &[Reading] {
        match self {
            RunOutcome::Completed(run) => &run.readings,
            RunOutcome::Cancelled { readings } | RunOutcome::Failed { readings, .. } => readings,
        }
    }

    pub fn readings_collected(&self) -> usize {
        self.readings().len()
    }

    pub fn test_run(&self) -> Option<&TestRun> {
        match self {
            RunOutcome::Completed(run) => Some(run),
            _ => None,
        }
    }

    pub fn into_test_run(self) -> Option<TestRun> {
        match self {
            RunOutcome::Completed(run) => Some(run),
            _ => None,
        }
    }

    /// One-line status text for the operator.
    pub fn status_message(&self) -> String {
        match self {
            RunOutcome::Completed(run) => format!("Test complete, result: {}", run.verdict_label()),
            RunOutcome::Failed { error, .. } => format!("Sampling failed: {}", error),
            RunOutcome::Cancelled { readings } if readings.is_empty() => "No data collected".to_string(),
            RunOutcome::Cancelled { readings } => {
                format!("Test cancelled after {} sample(s)", readings.len())
            }
        }
    }
}

/// A run that has left the worker, with the source handed back to the caller.
#[derive(Debug)]
pub struct FinishedRun<S> {
    pub source: S,
    pub outcome: RunOutcome,
}

/// Handle to a run executing on a background task.
pub struct RunHandle<S> {
    cancel: CancellationToken,
    task: JoinHandle<FinishedRun<S>>,
}

impl<S> RunHandle<S> {
    /// Request cancellation. Aborts an in-progress wait and prevents the next
    /// sample from starting. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to finish.
    pub async fn join(self) -> Result<FinishedRun<S>> {
        self.task.await.context("test-run worker terminated abnormally")
    }
}

/// Start a run on a single background worker.
///
/// `on_sample` is invoked on the worker, in index order, and the worker does
/// not continue until it returns.
pub fn spawn<S, F>(
    mut source: S,
    sample_count: NonZeroUsize,
    on_sample: F,
    cancel: CancellationToken,
) -> RunHandle<S>
where
    S: SampleSource + Send + 'static,
    F: FnMut(&Reading, usize) + Send + 'static,
{
    let worker_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        let outcome = run(&mut source, sample_count, on_sample, &worker_cancel).await;
        FinishedRun { source, outcome }
    });

    RunHandle { cancel, task }
}
