//! Testing utilities and fixtures
//!
//! Shared by unit tests, the integration suite under `tests/` and the
//! benchmarks.

pub mod fixtures;

pub use fixtures::{
    reference_sequences, reference_source, tagged_sequences, PendingSource,
    REFERENCE_INPUT,
};
