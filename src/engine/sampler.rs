use std::num::NonZeroUsize;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{RunOutcome, SampleSource};
use crate::analysis;
use crate::device::Reading;

/// Take `sample_count` readings from `source`, one every sampling interval.
///
/// Cancellation is checked before each collect and raced against each
/// inter-sample wait. The first collect error ends the run.
pub async fn run<S, F>(
    source: &mut S,
    sample_count: NonZeroUsize,
    mut on_sample: F,
    cancel: &CancellationToken,
) -> RunOutcome
where
    S: SampleSource,
    F: FnMut(&Reading, usize),
{
    let total = sample_count.get();
    let run_id = Uuid::new_v4().to_string();
    let interval = source.device().sampling_interval();
    let started_at = Utc::now();

    info!(
        run_id = run_id.as_str(),
        device = source.device().id(),
        kind = %source.device().kind(),
        samples = total,
        interval_ms = interval.as_millis() as u64,
        "test run started"
    );

    let mut readings: Vec<Reading> = Vec::with_capacity(total);
    let mut failure = None;

    for index in 0..total {
        if cancel.is_cancelled() {
            debug!(run_id = run_id.as_str(), index, "cancelled before sample");
            break;
        }

        match source.collect_reading() {
            Ok(reading) => {
                debug!(run_id = run_id.as_str(), index, value = reading.value, "sample collected");
                on_sample(&reading, index);
                readings.push(reading);
            }
            Err(e) => {
                error!(run_id = run_id.as_str(), index, error = %e, "sampling failed, aborting run");
                failure = Some(e);
                break;
            }
        }

        if index + 1 < total {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(run_id = run_id.as_str(), index, "cancelled during wait");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    let collected = readings.len();
    let outcome = match failure {
        Some(e) => RunOutcome::Failed {
            error: e.into(),
            readings,
        },
        None if collected == total => match analysis::analyze(readings, source.device(), started_at) {
            Ok(run) => RunOutcome::Completed(run),
            // Only empty input fails analysis, so there are no readings to keep.
            Err(e) => RunOutcome::Failed {
                error: e.into(),
                readings: Vec::new(),
            },
        },
        None => RunOutcome::Cancelled { readings },
    };

    info!(
        run_id = run_id.as_str(),
        state = %outcome.state(),
        collected,
        requested = total,
        "test run finished"
    );

    outcome
}
