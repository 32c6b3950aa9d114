use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// What happened to one executed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub index: usize,
    pub name: String,
    pub status: RunStatus,
    pub value: Option<Value>,
    pub failure: Option<String>,
}

impl RunOutcome {
    pub fn completed(index: usize, name: impl Into<String>, value: Value) -> Self {
        Self {
            index,
            name: name.into(),
            status: RunStatus::Completed,
            value: Some(value),
            failure: None,
        }
    }

    pub fn failed(index: usize, name: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: RunStatus::Failed,
            value: None,
            failure: Some(failure.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

/// Aggregate result of one scheduler invocation, ordered by run index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub trajectory: String,
    pub outcomes: Vec<RunOutcome>,
    /// Runs already completed before this invocation.
    pub skipped_completed: usize,
    /// Runs never started because the scheduler was drained.
    pub drained: usize,
}

impl RunReport {
    pub fn new(trajectory: impl Into<String>, skipped_completed: usize) -> Self {
        Self {
            trajectory: trajectory.into(),
            outcomes: Vec::new(),
            skipped_completed,
            drained: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.is_failed()).count()
    }

    pub fn outcome(&self, index: usize) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|outcome| outcome.index == index)
    }

    /// Every failed run as a [`TrajError::RunFailure`].
    pub fn failures(&self) -> Vec<TrajError> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_failed())
            .map(|outcome| {
                TrajError::RunFailure(
                    ErrorInfo::new(
                        "run-failed",
                        outcome.failure.clone().unwrap_or_default(),
                    )
                    .with_context("run", outcome.name.clone())
                    .with_context("index", outcome.index.to_string()),
                )
            })
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        !self.outcomes.iter().any(RunOutcome::is_failed)
    }
}
