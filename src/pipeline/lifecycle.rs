//! Stage lifecycle state machine
//!
//! Every task in the topology (source producer, mapper, shuffle drain,
//! shuffler, reducer, sink drain) walks the same one-shot lifecycle:
//!
//! ```text
//! ┌──────┐ Start ┌─────────┐ Drain ┌──────────┐ Close ┌────────┐
//! │ Idle │──────▶│ Running │──────▶│ Draining │──────▶│ Closed │
//! └──────┘       └─────────┘       └──────────┘       └────────┘
//! ```
//!
//! `Closed` is terminal. A stage unwinding after cancellation returns an
//! error instead of a report, so it never reaches `Closed` at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Identity of one task in the topology
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StageId {
    Loader,
    Source(usize),
    Mapper(usize),
    ShuffleDrain(usize),
    Shuffler,
    Reducer(String),
    Sink,
    SinkDrain(String),
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageId::Loader => write!(f, "loader"),
            StageId::Source(i) => write!(f, "source[{}]", i),
            StageId::Mapper(i) => write!(f, "mapper[{}]", i),
            StageId::ShuffleDrain(i) => write!(f, "shuffle-drain[{}]", i),
            StageId::Shuffler => write!(f, "shuffler"),
            StageId::Reducer(key) => write!(f, "reducer[{}]", key),
            StageId::Sink => write!(f, "sink"),
            StageId::SinkDrain(key) => write!(f, "sink-drain[{}]", key),
        }
    }
}

/// Lifecycle state of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// Events that move a stage through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    /// Begin consuming or producing
    Start,
    /// Input exhausted, flushing the final result
    Drain,
    /// Output closed, task finished
    Close,
}

/// Error type for lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Invalid transition from {from:?} with {transition:?}")]
    InvalidTransition {
        from: StageState,
        transition: StageTransition,
    },
}

/// Apply a transition to the current state
///
/// Pure function: returns the next state or an error for any move that is
/// not strictly forward.
pub fn apply_transition(
    state: StageState,
    transition: StageTransition,
) -> Result<StageState, StateError> {
    match (state, transition) {
        (StageState::Idle, StageTransition::Start) => Ok(StageState::Running),
        (StageState::Running, StageTransition::Drain) => Ok(StageState::Draining),
        (StageState::Draining, StageTransition::Close) => Ok(StageState::Closed),
        (from, transition) => Err(StateError::InvalidTransition { from, transition }),
    }
}

/// Final accounting for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageId,
    pub state: StageState,
    /// Values read from the stage's input stream(s)
    pub received: u64,
    /// Values written to the stage's output stream(s)
    pub emitted: u64,
}

/// Mutable lifecycle tracker owned by a single stage task
#[derive(Debug)]
pub struct StageLifecycle {
    stage: StageId,
    state: StageState,
    received: u64,
    emitted: u64,
}

impl StageLifecycle {
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            state: StageState::Idle,
            received: 0,
            emitted: 0,
        }
    }

    pub fn stage(&self) -> &StageId {
        &self.stage
    }

    pub fn transition(&mut self, transition: StageTransition) -> Result<StageState, StateError> {
        let next = apply_transition(self.state, transition)?;
        debug!(stage = %self.stage, from = ?self.state, to = ?next, "stage transition");
        self.state = next;
        Ok(next)
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    /// Fold a child task's counters into this stage's totals
    pub fn absorb(&mut self, child: &StageReport) {
        self.received += child.received;
        self.emitted += child.emitted;
    }

    pub fn into_report(self) -> StageReport {
        StageReport {
            stage: self.stage,
            state: self.state,
            received: self.received,
            emitted: self.emitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_is_valid() {
        let state = apply_transition(StageState::Idle, StageTransition::Start).unwrap();
        assert_eq!(state, StageState::Running);
        let state = apply_transition(state, StageTransition::Drain).unwrap();
        assert_eq!(state, StageState::Draining);
        let state = apply_transition(state, StageTransition::Close).unwrap();
        assert_eq!(state, StageState::Closed);
    }

    #[test]
    fn test_closed_is_terminal() {
        for transition in [
            StageTransition::Start,
            StageTransition::Drain,
            StageTransition::Close,
        ] {
            assert!(apply_transition(StageState::Closed, transition).is_err());
        }
    }

    #[test]
    fn test_cannot_skip_running() {
        let err = apply_transition(StageState::Idle, StageTransition::Drain).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: StageState::Idle,
                transition: StageTransition::Drain,
            }
        );
        assert!(apply_transition(StageState::Idle, StageTransition::Close).is_err());
        assert!(apply_transition(StageState::Running, StageTransition::Close).is_err());
        assert!(apply_transition(StageState::Draining, StageTransition::Start).is_err());
    }

    #[test]
    fn test_lifecycle_counts_and_reports() {
        let mut lifecycle = StageLifecycle::new(StageId::Mapper(0));
        lifecycle.transition(StageTransition::Start).unwrap();
        lifecycle.record_received();
        lifecycle.record_received();
        lifecycle.transition(StageTransition::Drain).unwrap();
        lifecycle.record_emitted();
        lifecycle.transition(StageTransition::Close).unwrap();

        let report = lifecycle.into_report();
        assert_eq!(report.state, StageState::Closed);
        assert_eq!(report.received, 2);
        assert_eq!(report.emitted, 1);
    }

    #[test]
    fn test_stage_id_display() {
        assert_eq!(StageId::Source(1).to_string(), "source[1]");
        assert_eq!(StageId::ShuffleDrain(0).to_string(), "shuffle-drain[0]");
        assert_eq!(StageId::SinkDrain("verb".into()).to_string(), "sink-drain[verb]");
    }
}
