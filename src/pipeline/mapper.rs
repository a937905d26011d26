//! Map phase: count classified symbols into one aggregate per sequence

use crate::classify::Classifier;
use crate::error::PipelineResult;
use crate::pipeline::channel::{self, StreamReceiver, StreamSender};
use crate::pipeline::lifecycle::{StageId, StageLifecycle, StageReport, StageTransition};
use crate::pipeline::types::{Aggregate, Symbol};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Run one mapper to completion
///
/// Reads symbols until the input closes, counting each symbol under the key
/// the classifier assigns (unclassified symbols are not counted). Emits the
/// finished [`Aggregate`] exactly once, then closes the output.
pub async fn run_mapper(
    index: usize,
    mut input: StreamReceiver<Symbol>,
    output: StreamSender<Aggregate>,
    classifier: Arc<dyn Classifier>,
    cancel: CancellationToken,
) -> PipelineResult<StageReport> {
    let mut lifecycle = StageLifecycle::new(StageId::Mapper(index));
    lifecycle.transition(StageTransition::Start)?;

    let mut aggregate = Aggregate::new(index);
    while let Some(symbol) = channel::recv(&mut input, &cancel, lifecycle.stage()).await? {
        lifecycle.record_received();
        match classifier.classify(&symbol) {
            Some(key) => aggregate.increment(key),
            None => trace!(stage = %lifecycle.stage(), %symbol, "symbol not classified"),
        }
    }

    lifecycle.transition(StageTransition::Drain)?;
    debug!(
        stage = %lifecycle.stage(),
        symbols = lifecycle.received(),
        keys = aggregate.counts.len(),
        "emitting aggregate"
    );
    channel::send(&output, aggregate, &cancel, lifecycle.stage()).await?;
    lifecycle.record_emitted();

    drop(output);
    lifecycle.transition(StageTransition::Close)?;
    Ok(lifecycle.into_report())
}
