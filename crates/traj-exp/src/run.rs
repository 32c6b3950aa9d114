use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError};

use crate::namespace::run_name;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// Entry of the run list. The name is derived from the index and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    index: usize,
    name: String,
    state: RunState,
    failure: Option<String>,
}

impl RunDescriptor {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            name: run_name(index),
            state: RunState::Pending,
            failure: None,
        }
    }

    /// Descriptor restored from persisted completion flags.
    pub fn restored(index: usize, state: RunState, failure: Option<String>) -> Self {
        Self {
            index,
            name: run_name(index),
            state,
            failure,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Applies a state transition.
    ///
    /// Allowed: `Pending|Failed -> Running`, `Running -> Completed|Failed`,
    /// and re-marking a completed run as completed.
    pub fn transition(&mut self, next: RunState, failure: Option<String>) -> Result<(), TrajError> {
        use RunState::*;
        let allowed = matches!(
            (self.state, next),
            (Pending | Failed, Running) | (Running, Completed | Failed) | (Completed, Completed)
        );
        if !allowed {
            return Err(TrajError::Access(
                ErrorInfo::new("run-transition", "illegal run state transition")
                    .with_context("run", self.name.clone())
                    .with_context("from", self.state.as_str())
                    .with_context("to", next.as_str()),
            ));
        }
        self.state = next;
        self.failure = if next == Failed { failure } else { None };
        Ok(())
    }
}
