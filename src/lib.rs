//! # Tallyflow
//!
//! A bounded MapReduce pipeline built from tokio tasks and closeable channels.
//!
//! ```text
//! Source -> {Mapper} x N -> Shuffler -> {Reducer} x K -> Sink
//! ```
//!
//! Completion flows through the topology by closing streams: each producer
//! closes its output once it has emitted everything, and every fan-in point
//! waits on a barrier before closing downstream. A shared cancellation token
//! and an optional deadline bound the lifetime of a run.
//!
//! ## Modules
//!
//! - `pipeline` - the stages, their wiring and the run report
//! - `config` - TOML configuration with environment overrides
//! - `input` - pluggable sequence sources (memory, text files)
//! - `classify` - pluggable symbol to key classification
//! - `render` - pluggable output for reducer summaries
//! - `error` - the crate-wide error type
//! - `testing` - fixtures shared by tests and benchmarks
pub mod classify;
pub mod config;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod render;

pub mod testing;


pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, RunReport};
