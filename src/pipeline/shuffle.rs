//! Shuffle phase: route aggregate entries to per-key partitions
//!
//! One drain task per mapper stream forwards entries to the partition that
//! owns their key, so a slow mapper never holds up the others. The shuffler
//! itself owns the partition senders; it waits on a barrier over all drains
//! and only then drops them, which closes every partition exactly once.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::channel::{self, StreamReceiver, StreamSender};
use crate::pipeline::lifecycle::{StageId, StageLifecycle, StageReport, StageTransition};
use crate::pipeline::task::{join_barrier, partition_results, root_cause, spawn_stage};
use crate::pipeline::types::{Aggregate, KeySet, KeyedValue, UnknownKeyPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Result of a completed shuffle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleReport {
    /// The shuffler coordinator followed by one report per drain task
    pub stages: Vec<StageReport>,
    /// Aggregate entries discarded because their key was not declared
    pub dropped_values: u64,
}

/// Outcome of a single drain task
#[derive(Debug)]
struct DrainReport {
    stage: StageReport,
    dropped_values: u64,
}

/// Drain every input stream into the keyed partitions
///
/// `partitions[i]` is the stream for the `i`-th key of `keys`. All partitions are
/// closed when this function returns, whether it succeeds or not.
pub async fn run_shuffler(
    inputs: Vec<StreamReceiver<Aggregate>>,
    partitions: Vec<StreamSender<KeyedValue>>,
    keys: Arc<KeySet>,
    policy: UnknownKeyPolicy,
    cancel: CancellationToken,
) -> PipelineResult<ShuffleReport> {
    if partitions.len() != keys.len() {
        return Err(PipelineError::invalid_config(
            "partitions",
            format!(
                "{} partition streams for {} declared keys",
                partitions.len(),
                keys.len()
            ),
        ));
    }

    let mut lifecycle = StageLifecycle::new(StageId::Shuffler);
    lifecycle.transition(StageTransition::Start)?;

    let partitions: Arc<[StreamSender<KeyedValue>]> = partitions.into();
    let handles = inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let partitions = Arc::clone(&partitions);
            let keys = Arc::clone(&keys);
            let drain_cancel = cancel.clone();
            spawn_stage(StageId::ShuffleDrain(index), &cancel, async move {
                drain(index, input, partitions, keys, policy, drain_cancel).await
            })
        })
        .collect::<Vec<_>>();
    debug!(drains = handles.len(), partitions = keys.len(), "shuffle started");

    // Barrier: nothing may close until every mapper stream is exhausted
    let (drains, errors) = partition_results(join_barrier(handles).await);
    lifecycle.transition(StageTransition::Drain)?;

    // Every drain has finished, so this is the last reference to the senders
    drop(partitions);
    debug!(partitions = keys.len(), "closed all partitions");
    lifecycle.transition(StageTransition::Close)?;

    if let Some(error) = root_cause(errors) {
        return Err(error);
    }

    let mut dropped_values = 0;
    let mut stages = Vec::with_capacity(drains.len() + 1);
    for drain in &drains {
        dropped_values += drain.dropped_values;
        lifecycle.absorb(&drain.stage);
    }
    stages.push(lifecycle.into_report());
    stages.extend(drains.into_iter().map(|d| d.stage));

    Ok(ShuffleReport {
        stages,
        dropped_values,
    })
}

async fn drain(
    index: usize,
    mut input: StreamReceiver<Aggregate>,
    partitions: Arc<[StreamSender<KeyedValue>]>,
    keys: Arc<KeySet>,
    policy: UnknownKeyPolicy,
    cancel: CancellationToken,
) -> PipelineResult<DrainReport> {
    let mut lifecycle = StageLifecycle::new(StageId::ShuffleDrain(index));
    lifecycle.transition(StageTransition::Start)?;
    let mut dropped_values = 0;

    while let Some(aggregate) = channel::recv(&mut input, &cancel, lifecycle.stage()).await? {
        lifecycle.record_received();
        let mapper = aggregate.mapper;

        for (key, count) in aggregate.counts {
            let Some(position) = keys.position(&key) else {
                match policy {
                    UnknownKeyPolicy::Drop => {
                        debug!(stage = %lifecycle.stage(), %key, count, "dropping undeclared key");
                        dropped_values += 1;
                        continue;
                    }
                    UnknownKeyPolicy::Reject => {
                        warn!(stage = %lifecycle.stage(), %key, mapper, "rejecting undeclared key");
                        return Err(PipelineError::UnknownKey { key, mapper });
                    }
                }
            };

            trace!(stage = %lifecycle.stage(), %key, count, "route value");
            let value = KeyedValue { key, value: count };
            channel::send(&partitions[position], value, &cancel, lifecycle.stage()).await?;
            lifecycle.record_emitted();
        }
    }

    lifecycle.transition(StageTransition::Drain)?;
    lifecycle.transition(StageTransition::Close)?;
    Ok(DrainReport {
        stage: lifecycle.into_report(),
        dropped_values,
    })
}
