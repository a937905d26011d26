//! Spawning and joining stage tasks

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::lifecycle::StageId;
use futures::future::join_all;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to a spawned stage paired with its identity
pub type StageHandle<T> = (StageId, JoinHandle<PipelineResult<T>>);

/// Spawn a stage task that cancels the whole run if it fails or panics
pub fn spawn_stage<F, T>(stage: StageId, cancel: &CancellationToken, work: F) -> StageHandle<T>
where
    F: Future<Output = PipelineResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let guard = cancel.clone().drop_guard();
    let id = stage.clone();
    let handle = tokio::spawn(async move {
        let result = work.await;
        match &result {
            Ok(_) => {
                guard.disarm();
            }
            Err(e) if e.is_cancellation() => {}
            Err(e) => warn!(stage = %id, error = %e, "stage failed, cancelling pipeline"),
        }
        // On error or panic the guard drops here and cancels every other stage
        result
    });
    (stage, handle)
}

/// Wait for every handle to finish (the fan-in barrier)
///
/// Results come back in the order the handles were given. A task that
/// panicked or was aborted is reported as [`PipelineError::StageFailed`].
pub async fn join_barrier<T>(handles: Vec<StageHandle<T>>) -> Vec<PipelineResult<T>> {
    let (stages, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    join_all(handles)
        .await
        .into_iter()
        .zip(stages)
        .map(|(joined, stage)| match joined {
            Ok(result) => result,
            Err(source) => Err(PipelineError::StageFailed { stage, source }),
        })
        .collect()
}

/// Pick the error to report from a set of stage failures
///
/// A root cause (anything other than cancellation fallout) wins over the
/// `Cancelled`/`Disconnected` errors it triggers in neighbouring stages.
pub fn root_cause(errors: Vec<PipelineError>) -> Option<PipelineError> {
    let mut fallout = None;
    for error in errors {
        if !error.is_cancellation() {
            return Some(error);
        }
        fallout.get_or_insert(error);
    }
    fallout
}

/// Split joined results into successes and errors
pub fn partition_results<T>(results: Vec<PipelineResult<T>>) -> (Vec<T>, Vec<PipelineError>) {
    let mut ok = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => errors.push(e),
        }
    }
    (ok, errors)
}
