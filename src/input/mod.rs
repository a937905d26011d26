//! Pluggable input sources
//!
//! A source supplies the N sequences of a run up front. The pipeline neither
//! knows nor cares where they come from; one sequence becomes one mapper.

mod file;
mod memory;

pub use file::{tokenize, FileSource};
pub use memory::MemorySource;

use crate::error::PipelineResult;
use crate::pipeline::types::Sequence;
use async_trait::async_trait;

/// Supplies the input sequences for a run
#[async_trait]
pub trait SequenceSource: Send + Sync {
    /// Load every sequence; the result length fixes the number of mappers
    async fn load(&self) -> PipelineResult<Vec<Sequence>>;
}
