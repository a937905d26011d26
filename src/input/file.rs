use super::SequenceSource;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::{Sequence, Symbol};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// One sequence per text file
///
/// Files are read with `tokio::fs` and split by [`tokenize`].
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SequenceSource for FileSource {
    async fn load(&self) -> PipelineResult<Vec<Sequence>> {
        let mut sequences = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let content =
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| PipelineError::SourceLoad {
                        path: path.clone(),
                        source,
                    })?;
            let sequence = tokenize(&content);
            debug!(path = %path.display(), symbols = sequence.len(), "loaded sequence");
            sequences.push(sequence);
        }
        Ok(sequences)
    }
}

/// Split text into lower-cased words
///
/// Splits on whitespace, trims surrounding ASCII punctuation and drops
/// anything left empty.
pub fn tokenize(text: &str) -> Sequence {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty())
        .map(|word| Symbol::new(word.to_lowercase()))
        .collect()
}
