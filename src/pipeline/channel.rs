//! Bounded, closeable streams between stages
//!
//! A stream is a tokio `mpsc` channel. The producer owns the only
//! [`StreamSender`]; dropping it is the close. Sends and receives race the
//! run's cancellation token so a stalled neighbour can never park a task
//! forever.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::lifecycle::StageId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type StreamSender<T> = mpsc::Sender<T>;
pub type StreamReceiver<T> = mpsc::Receiver<T>;

/// Create a bounded stream
///
/// `capacity` is validated by the configuration layer; tokio panics on zero.
pub fn stream<T>(capacity: usize) -> (StreamSender<T>, StreamReceiver<T>) {
    mpsc::channel(capacity)
}

/// Create `count` independent streams of the same capacity
pub fn streams<T>(count: usize, capacity: usize) -> (Vec<StreamSender<T>>, Vec<StreamReceiver<T>>) {
    (0..count).map(|_| stream(capacity)).unzip()
}

/// Send a value, suspending while the buffer is full
///
/// Fails with [`PipelineError::Cancelled`] when the token fires first and
/// with [`PipelineError::Disconnected`] when the consumer is gone.
pub async fn send<T>(
    tx: &StreamSender<T>,
    value: T,
    cancel: &CancellationToken,
    stage: &StageId,
) -> PipelineResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage: stage.clone() }),
        sent = tx.send(value) => sent.map_err(|_| PipelineError::Disconnected { stage: stage.clone() }),
    }
}

/// Receive the next value; `Ok(None)` once the producer has closed the stream
pub async fn recv<T>(
    rx: &mut StreamReceiver<T>,
    cancel: &CancellationToken,
    stage: &StageId,
) -> PipelineResult<Option<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage: stage.clone() }),
        value = rx.recv() => Ok(value),
    }
}
