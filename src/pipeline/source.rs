//! Input distribution: one producer task per sequence

use crate::error::PipelineResult;
use crate::pipeline::channel::{self, StreamReceiver, StreamSender};
use crate::pipeline::lifecycle::{StageId, StageLifecycle, StageReport, StageTransition};
use crate::pipeline::task::{spawn_stage, StageHandle};
use crate::pipeline::types::{Sequence, Symbol};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Spawn one producer per sequence and return immediately
///
/// Producer `i` pushes the symbols of `sequences[i]` in order onto stream
/// `i`, then closes it. The returned receivers are indexed the same way.
pub fn spawn_sources(
    sequences: Vec<Sequence>,
    capacity: usize,
    cancel: &CancellationToken,
) -> (Vec<StreamReceiver<Symbol>>, Vec<StageHandle<StageReport>>) {
    let mut receivers = Vec::with_capacity(sequences.len());
    let mut handles = Vec::with_capacity(sequences.len());

    for (index, sequence) in sequences.into_iter().enumerate() {
        let (tx, rx) = channel::stream(capacity);
        let stage_cancel = cancel.clone();
        handles.push(spawn_stage(StageId::Source(index), cancel, async move {
            produce(index, sequence, tx, stage_cancel).await
        }));
        receivers.push(rx);
    }

    (receivers, handles)
}

async fn produce(
    index: usize,
    sequence: Sequence,
    tx: StreamSender<Symbol>,
    cancel: CancellationToken,
) -> PipelineResult<StageReport> {
    let mut lifecycle = StageLifecycle::new(StageId::Source(index));
    lifecycle.transition(StageTransition::Start)?;

    for symbol in sequence {
        trace!(stage = %lifecycle.stage(), %symbol, "emit symbol");
        channel::send(&tx, symbol, &cancel, lifecycle.stage()).await?;
        lifecycle.record_emitted();
    }

    lifecycle.transition(StageTransition::Drain)?;
    drop(tx);
    lifecycle.transition(StageTransition::Close)?;
    Ok(lifecycle.into_report())
}
