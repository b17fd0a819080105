// src/daemon/worker.rs

//! Worker thread running endpoint checks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::daemon::queue::WorkerQueues;
use crate::error::{AuditError, Result};
use crate::logging::{self, LogPipe};
use crate::models::{CheckTask, TaskOutcome, TaskReport};
use crate::pipeline::{CheckOutcome, Checker};
use crate::utils::StopSignal;
use crate::utils::fs::purge_cache;

/// Worker behaviour shared by all workers of a run.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Longest wait for a task before looking at the stop signal again
    pub poll: Duration,
    /// Leave downloaded dumps in the cache after each check
    pub keep_dumps: bool,
}

pub struct Worker {
    id: usize,
    checker: Arc<Checker>,
    queues: WorkerQueues,
    stop: StopSignal,
    settings: WorkerSettings,
    log_pipe: Option<LogPipe>,
}

impl Worker {
    pub fn new(
        id: usize,
        checker: Arc<Checker>,
        queues: WorkerQueues,
        stop: StopSignal,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            checker,
            queues,
            stop,
            settings,
            log_pipe: None,
        }
    }

    /// Route this worker's records through `pipe` once it runs.
    pub fn with_log_pipe(mut self, pipe: LogPipe) -> Self {
        self.log_pipe = Some(pipe);
        self
    }

    /// Take tasks until the stop signal is set or the coordinator is gone.
    pub fn run(mut self) {
        if let Some(pipe) = self.log_pipe.take() {
            logging::attach(pipe);
        }
        log::debug!("Worker {} started", self.id);

        while !self.stop.is_set() {
            match self.queues.tasks.recv_timeout(self.settings.poll) {
                Ok(task) => {
                    self.handle(task);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::debug!("Worker {} stopping", self.id);
        logging::detach();
    }

    /// Check one endpoint, requeue it on failure and report the outcome.
    pub fn handle(&self, task: CheckTask) -> TaskOutcome {
        let start = Instant::now();
        let result = self.check_isolated(&task.rse);
        let minutes = start.elapsed().as_secs() / 60;

        match &result {
            Ok(_) => log::info!("SUCCESS checking {} in {} minutes", task.rse, minutes),
            Err(e) => log::error!(
                "Check failed for {} in {} minutes, {} attempts remaining: {}: {}",
                task.rse,
                minutes,
                task.attempts,
                e.kind(),
                e
            ),
        }

        if !self.settings.keep_dumps {
            purge_cache(&self.checker.settings().cache_dir, &task.rse);
        }

        let outcome = match result {
            Ok(CheckOutcome::Processed(_)) => TaskOutcome::Succeeded,
            Ok(CheckOutcome::Skipped) => TaskOutcome::Skipped,
            Err(_) => self.requeue(&task),
        };

        // The coordinator may already be gone during shutdown.
        let _ = self.queues.reports.send(TaskReport {
            rse: task.rse,
            outcome,
        });
        outcome
    }

    fn requeue(&self, task: &CheckTask) -> TaskOutcome {
        let Some(next) = task.retry() else {
            log::error!("Giving up on {}, no attempts left", task.rse);
            return TaskOutcome::Exhausted;
        };
        if self.queues.retry.send(next).is_err() {
            log::warn!("Retry queue closed, dropping {}", task.rse);
            return TaskOutcome::Exhausted;
        }
        TaskOutcome::Retried
    }

    /// Run a check, turning a panic into an error for that endpoint.
    fn check_isolated(&self, rse: &str) -> Result<CheckOutcome> {
        panic::catch_unwind(AssertUnwindSafe(|| self.checker.check(rse)))
            .unwrap_or_else(|payload| Err(AuditError::Fault(panic_message(payload.as_ref()))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::thread;

    use chrono::NaiveDate;

    use crate::daemon::queue::TaskQueues;
    use crate::daemon::testing::Site;
    use crate::pipeline::{CheckSettings, OutputOptions};
    use crate::storage::{CatalogSnapshot, DiffInputs, DiffStream, DumpProvider, SiteDump};
    use crate::utils::fs::cache_artifacts;

    fn settings(keep_dumps: bool) -> WorkerSettings {
        WorkerSettings {
            poll: Duration::from_millis(20),
            keep_dumps,
        }
    }

    fn worker(checker: Arc<Checker>, queues: &TaskQueues, keep_dumps: bool) -> Worker {
        Worker::new(
            0,
            checker,
            queues.worker_ends(),
            StopSignal::new(),
            settings(keep_dumps),
        )
    }

    #[test]
    fn failing_endpoint_gets_attempts_plus_one_tries() {
        let site = Site::new();
        let queues = TaskQueues::new();
        let worker = worker(site.checker(), &queues, false);
        let feeder = queues.feeder_ends();

        let mut task = CheckTask::new("MISSING", 2);
        let mut outcomes = Vec::new();
        loop {
            let outcome = worker.handle(task);
            outcomes.push(outcome);
            match feeder.retry.try_recv() {
                Ok(next) => task = next,
                Err(_) => break,
            }
        }

        assert_eq!(
            outcomes,
            vec![
                TaskOutcome::Retried,
                TaskOutcome::Retried,
                TaskOutcome::Exhausted
            ]
        );
        let reports: Vec<_> = feeder.reports.try_iter().collect();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|report| report.rse == "MISSING"));
    }

    #[test]
    fn success_purges_cache_then_skips() {
        let site = Site::new();
        site.add_endpoint("E1", 100);
        let queues = TaskQueues::new();
        let worker = worker(site.checker(), &queues, false);

        assert_eq!(worker.handle(CheckTask::new("E1", 3)), TaskOutcome::Succeeded);
        assert!(cache_artifacts(&site.config.paths.cache_dir, "E1")
            .unwrap()
            .is_empty());
        assert_eq!(worker.handle(CheckTask::new("E1", 3)), TaskOutcome::Skipped);
    }

    #[test]
    fn keep_dumps_leaves_cache_alone() {
        let site = Site::new();
        site.add_endpoint("E1", 100);
        let queues = TaskQueues::new();
        let worker = worker(site.checker(), &queues, true);

        assert_eq!(worker.handle(CheckTask::new("E1", 3)), TaskOutcome::Succeeded);
        let cached = cache_artifacts(&site.config.paths.cache_dir, "E1").unwrap();
        assert_eq!(cached.len(), 3);
    }

    struct PanickingProvider;

    impl DumpProvider for PanickingProvider {
        fn fetch_site_dump(&self, _rse: &str, _dest_dir: &Path) -> Result<SiteDump> {
            panic!("dump server went away");
        }

        fn fetch_catalog_snapshot(
            &self,
            _rse: &str,
            _date: NaiveDate,
            _cache_dir: &Path,
        ) -> Result<CatalogSnapshot> {
            unreachable!()
        }

        fn diff<'a>(&'a self, _label: &str, _inputs: DiffInputs<'a>) -> Result<DiffStream<'a>> {
            unreachable!()
        }
    }

    #[test]
    fn panicking_check_is_retried() {
        let site = Site::new();
        let checker = Arc::new(Checker::new(
            Arc::new(PanickingProvider),
            site.quarantine(),
            CheckSettings::from(&site.config),
            OutputOptions::default(),
        ));
        let queues = TaskQueues::new();
        let worker = worker(checker, &queues, false);
        let feeder = queues.feeder_ends();

        assert_eq!(worker.handle(CheckTask::new("E1", 1)), TaskOutcome::Retried);
        assert_eq!(feeder.retry.try_recv().unwrap(), CheckTask::new("E1", 0));
    }

    #[test]
    fn run_stops_on_signal() {
        let site = Site::new();
        site.add_endpoint("E1", 100);
        let queues = TaskQueues::new();
        let stop = StopSignal::new();
        let worker = Worker::new(
            1,
            site.checker(),
            queues.worker_ends(),
            stop.clone(),
            settings(false),
        );
        let feeder = queues.feeder_ends();

        let handle = thread::spawn(move || worker.run());
        feeder.tasks.send(CheckTask::new("E1", 3)).unwrap();
        let report = feeder.reports.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(report.outcome, TaskOutcome::Succeeded);

        stop.set();
        handle.join().unwrap();
    }
}
