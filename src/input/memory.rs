use super::SequenceSource;
use crate::error::PipelineResult;
use crate::pipeline::types::Sequence;
use async_trait::async_trait;

/// Fixed, in-memory sequences
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sequences: Vec<Sequence>,
}

impl MemorySource {
    pub fn new(sequences: Vec<Sequence>) -> Self {
        Self { sequences }
    }

    /// Build from nested word lists, one inner list per sequence
    pub fn from_words<S: AsRef<str>>(sequences: &[&[S]]) -> Self {
        Self {
            sequences: sequences
                .iter()
                .map(|words| Sequence::from_words(*words))
                .collect(),
        }
    }
}

#[async_trait]
impl SequenceSource for MemorySource {
    async fn load(&self) -> PipelineResult<Vec<Sequence>> {
        Ok(self.sequences.clone())
    }
}
