//! Output collection: drain every result stream into the renderer

use crate::error::PipelineResult;
use crate::pipeline::channel::{self, StreamReceiver};
use crate::pipeline::lifecycle::{StageId, StageLifecycle, StageReport, StageTransition};
use crate::pipeline::task::{join_barrier, partition_results, root_cause, spawn_stage};
use crate::pipeline::types::Summary;
use crate::render::Renderer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything the sink observed
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReport {
    /// Summaries in the order of the result streams given to the sink
    pub summaries: Vec<Summary>,
    /// One report per drain task
    pub stages: Vec<StageReport>,
}

/// Drain all result streams concurrently
///
/// Each `(key, stream)` pair gets its own drain task; every summary received
/// is handed to `renderer` exactly once. Returns only after every stream has
/// closed, which makes this the completion point of a run.
pub async fn run_sink(
    inputs: Vec<(String, StreamReceiver<Summary>)>,
    renderer: Arc<dyn Renderer>,
    cancel: CancellationToken,
) -> PipelineResult<SinkReport> {
    let handles = inputs
        .into_iter()
        .map(|(key, input)| {
            let renderer = Arc::clone(&renderer);
            let drain_cancel = cancel.clone();
            spawn_stage(StageId::SinkDrain(key.clone()), &cancel, async move {
                drain(key, input, renderer, drain_cancel).await
            })
        })
        .collect::<Vec<_>>();
    debug!(streams = handles.len(), "sink started");

    let (drains, errors) = partition_results(join_barrier(handles).await);
    if let Some(error) = root_cause(errors) {
        return Err(error);
    }

    let mut summaries = Vec::new();
    let mut stages = Vec::with_capacity(drains.len());
    for (stage, received) in drains {
        summaries.extend(received);
        stages.push(stage);
    }
    debug!(summaries = summaries.len(), "sink finished");

    Ok(SinkReport { summaries, stages })
}

async fn drain(
    key: String,
    mut input: StreamReceiver<Summary>,
    renderer: Arc<dyn Renderer>,
    cancel: CancellationToken,
) -> PipelineResult<(StageReport, Vec<Summary>)> {
    let mut lifecycle = StageLifecycle::new(StageId::SinkDrain(key));
    lifecycle.transition(StageTransition::Start)?;

    let mut received = Vec::new();
    while let Some(summary) = channel::recv(&mut input, &cancel, lifecycle.stage()).await? {
        lifecycle.record_received();
        renderer.render(&summary)?;
        lifecycle.record_emitted();
        received.push(summary);
    }

    lifecycle.transition(StageTransition::Drain)?;
    lifecycle.transition(StageTransition::Close)?;
    Ok((lifecycle.into_report(), received))
}
