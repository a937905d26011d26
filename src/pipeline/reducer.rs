//! Reduce phase: fold one partition into its mean

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::channel::{self, StreamReceiver, StreamSender};
use crate::pipeline::lifecycle::{StageId, StageLifecycle, StageReport, StageTransition};
use crate::pipeline::types::{EmptyPartitionPolicy, KeyedValue, Summary};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run the reducer that owns `key`
///
/// Accumulates a running sum and count until the partition closes, then
/// emits at most one [`Summary`] and closes the output. What happens to an
/// empty partition is decided by `policy`.
pub async fn run_reducer(
    key: String,
    mut input: StreamReceiver<KeyedValue>,
    output: StreamSender<Summary>,
    policy: EmptyPartitionPolicy,
    cancel: CancellationToken,
) -> PipelineResult<StageReport> {
    let mut lifecycle = StageLifecycle::new(StageId::Reducer(key.clone()));
    lifecycle.transition(StageTransition::Start)?;

    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    while let Some(keyed) = channel::recv(&mut input, &cancel, lifecycle.stage()).await? {
        lifecycle.record_received();
        debug_assert_eq!(keyed.key, key, "value routed to the wrong reducer");
        sum += keyed.value;
        count += 1;
    }

    lifecycle.transition(StageTransition::Drain)?;
    let summary = if count > 0 {
        Some(Summary::from_totals(key.as_str(), sum, count))
    } else {
        match policy {
            EmptyPartitionPolicy::Nan => {
                debug!(stage = %lifecycle.stage(), "empty partition, emitting NaN");
                Some(Summary::from_totals(key.as_str(), 0, 0))
            }
            EmptyPartitionPolicy::Skip => {
                debug!(stage = %lifecycle.stage(), "empty partition, skipping summary");
                None
            }
            EmptyPartitionPolicy::Fail => {
                warn!(stage = %lifecycle.stage(), "empty partition");
                return Err(PipelineError::EmptyPartition { key });
            }
        }
    };

    if let Some(summary) = summary {
        debug!(stage = %lifecycle.stage(), sum, count, mean = summary.mean, "emitting summary");
        channel::send(&output, summary, &cancel, lifecycle.stage()).await?;
        lifecycle.record_emitted();
    }

    drop(output);
    lifecycle.transition(StageTransition::Close)?;
    Ok(lifecycle.into_report())
}
