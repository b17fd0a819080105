// src/models/task.rs

use serde::{Deserialize, Serialize};

/// One pending consistency check for an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTask {
    pub rse: String,
    /// Retries left after this attempt fails
    pub attempts: u32,
}

impl CheckTask {
    pub fn new(rse: impl Into<String>, attempts: u32) -> Self {
        Self {
            rse: rse.into(),
            attempts,
        }
    }

    /// The task to requeue after a failure, if any budget is left.
    pub fn retry(&self) -> Option<CheckTask> {
        self.attempts.checked_sub(1).map(|attempts| CheckTask {
            rse: self.rse.clone(),
            attempts,
        })
    }
}

/// How a worker finished one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Result produced and processed
    Succeeded,
    /// Endpoint already audited for this dump date
    Skipped,
    /// Failed, requeued with a decremented budget
    Retried,
    /// Failed with no attempts left, dropped
    Exhausted,
}

impl TaskOutcome {
    /// No further work is scheduled for the endpoint.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskOutcome::Retried)
    }
}

/// Outcome notification sent by a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub rse: String,
    pub outcome: TaskOutcome,
}
