//! The MapReduce topology
//!
//! - `types` - data flowing between stages and the run policies
//! - `channel` - bounded streams with cancel-aware send/recv
//! - `lifecycle` - per-stage state machine and reports
//! - `task` - spawning stages and the fan-in barrier
//! - `source`, `mapper`, `shuffle`, `reducer`, `sink` - the stages
//! - `runner` - wiring, deadline and cancellation for a whole run

pub mod channel;
pub mod lifecycle;
pub mod mapper;
pub mod reducer;
pub mod runner;
pub mod shuffle;
pub mod sink;
pub mod source;
pub mod task;
pub mod types;

pub use lifecycle::{StageId, StageReport, StageState};
pub use runner::{Pipeline, RunReport};
pub use types::{
    Aggregate, EmptyPartitionPolicy, KeySet, KeyedValue, Sequence, Summary, Symbol,
    UnknownKeyPolicy,
};
