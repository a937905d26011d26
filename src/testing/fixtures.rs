//! Canned inputs for pipeline runs

use crate::error::PipelineResult;
use crate::input::{MemorySource, SequenceSource};
use crate::pipeline::types::{Sequence, Symbol};
use async_trait::async_trait;

/// Three pre-tagged sentences: noun averages 8/3, verb averages 7/3
pub const REFERENCE_INPUT: [&[&str]; 3] = [
    &["noun", "verb", "verb", "noun", "noun"],
    &["verb", "verb", "verb", "noun", "noun", "verb"],
    &["noun", "noun", "verb", "noun"],
];

pub fn reference_sequences() -> Vec<Sequence> {
    REFERENCE_INPUT
        .iter()
        .map(|words| Sequence::from_words(*words))
        .collect()
}

pub fn reference_source() -> MemorySource {
    MemorySource::new(reference_sequences())
}

/// `count` sequences of `len` symbols cycling through `keys`
///
/// Sequence `i` starts its cycle at offset `i`.
pub fn tagged_sequences(count: usize, len: usize, keys: &[&str]) -> Vec<Sequence> {
    (0..count)
        .map(|i| {
            (0..len)
                .map(|j| keys[(i + j) % keys.len()])
                .map(Symbol::from)
                .collect::<Sequence>()
        })
        .collect()
}

/// A source whose load never completes, modelling a stalled producer
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingSource;

#[async_trait]
impl SequenceSource for PendingSource {
    async fn load(&self) -> PipelineResult<Vec<Sequence>> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_sequences_shape() {
        let sequences = tagged_sequences(4, 10, &["noun", "verb"]);
        assert_eq!(sequences.len(), 4);
        assert!(sequences.iter().all(|s| s.len() == 10));
    }

    #[test]
    fn test_reference_sequences_lengths() {
        let lengths: Vec<_> = reference_sequences().iter().map(Sequence::len).collect();
        assert_eq!(lengths, vec![5, 6, 4]);
    }
}
