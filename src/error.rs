//! Structured error types for pipeline runs
//!
//! Every stage, the configuration layer and the pluggable sources and sinks
//! report failures through [`PipelineError`]. Variants carry enough context
//! (stage, key, path) to be actionable without a backtrace.

use crate::pipeline::lifecycle::{StageId, StateError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    // Configuration errors
    #[error("Invalid pipeline configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Failed to read configuration {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // Input errors
    #[error("Failed to load input sequence from {}", path.display())]
    SourceLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Data errors
    #[error("Mapper {mapper} produced key '{key}' outside the declared key set")]
    UnknownKey { key: String, mapper: usize },

    #[error("Reducer for key '{key}' received no values")]
    EmptyPartition { key: String },

    // Concurrency errors
    #[error("Downstream of {stage} hung up before all values were delivered")]
    Disconnected { stage: StageId },

    #[error("{stage} was cancelled")]
    Cancelled { stage: StageId },

    #[error("Pipeline did not finish within {deadline:?}")]
    DeadlineExceeded { deadline: Duration },

    #[error("{stage} task terminated abnormally")]
    StageFailed {
        stage: StageId,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error(transparent)]
    InvalidTransition(#[from] StateError),

    // Output errors
    #[error("Failed to render summary for key '{key}'")]
    Render {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Build an [`PipelineError::InvalidConfiguration`] from anything printable
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that are a consequence of cancellation rather than a root cause
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. } | Self::Disconnected { .. } | Self::DeadlineExceeded { .. }
        )
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
