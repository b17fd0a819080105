// src/daemon/queue.rs

//! Channels between the coordinator and its workers.
//!
//! ```text
//!  coordinator ──tasks──▶ worker ─┬─retry───▶ coordinator
//!                                 └─reports─▶ coordinator
//! ```
//!
//! Retried tasks do not go back on the primary channel directly. The
//! coordinator owns the only primary sender and refeeds them after the
//! configured backoff.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::models::{CheckTask, TaskReport};

/// The three channels of a run, before being split between threads.
pub struct TaskQueues {
    tasks: (Sender<CheckTask>, Receiver<CheckTask>),
    retry: (Sender<CheckTask>, Receiver<CheckTask>),
    reports: (Sender<TaskReport>, Receiver<TaskReport>),
}

/// Channel ends held by one worker.
#[derive(Clone)]
pub struct WorkerQueues {
    pub tasks: Receiver<CheckTask>,
    pub retry: Sender<CheckTask>,
    pub reports: Sender<TaskReport>,
}

/// Channel ends held by the coordinator.
pub struct FeederQueues {
    pub tasks: Sender<CheckTask>,
    pub retry: Receiver<CheckTask>,
    pub reports: Receiver<TaskReport>,
}

impl TaskQueues {
    pub fn new() -> Self {
        Self {
            tasks: unbounded(),
            retry: unbounded(),
            reports: unbounded(),
        }
    }

    pub fn worker_ends(&self) -> WorkerQueues {
        WorkerQueues {
            tasks: self.tasks.1.clone(),
            retry: self.retry.0.clone(),
            reports: self.reports.0.clone(),
        }
    }

    /// Hand the coordinator its ends, dropping the spare worker ends.
    pub fn feeder_ends(self) -> FeederQueues {
        FeederQueues {
            tasks: self.tasks.0,
            retry: self.retry.1,
            reports: self.reports.1,
        }
    }
}

impl Default for TaskQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskOutcome;

    #[test]
    fn workers_disconnect_once_feeder_is_gone() {
        let queues = TaskQueues::new();
        let worker = queues.worker_ends();
        let feeder = queues.feeder_ends();

        feeder.tasks.send(CheckTask::new("E1", 3)).unwrap();
        worker
            .reports
            .send(TaskReport {
                rse: "E1".into(),
                outcome: TaskOutcome::Skipped,
            })
            .unwrap();

        assert_eq!(worker.tasks.recv().unwrap().rse, "E1");
        assert_eq!(feeder.reports.recv().unwrap().outcome, TaskOutcome::Skipped);

        drop(feeder);
        assert!(worker.tasks.recv().is_err());
        assert!(worker.retry.send(CheckTask::new("E1", 2)).is_err());
    }
}
