// src/daemon/mod.rs

//! Audit daemon: a coordinator feeding endpoint checks to worker threads.
//!
//! # Threads
//!
//! ```text
//!              ┌─────────────┐  tasks   ┌──────────┐
//!  endpoints ─▶│ coordinator │─────────▶│ worker-N │──┐
//!              │  (feeder)   │◀─retry───│          │  │ log records
//!              │             │◀─reports─│          │  │
//!              └─────────────┘          └──────────┘  ▼
//!                                              ┌────────────┐
//!                                              │ aggregator │─▶ log file
//!                                              └────────────┘
//! ```
//!
//! Each endpoint is checked at most `attempts + 1` times. Failed checks
//! come back on the retry channel and are refed after the backoff. The run
//! ends once every endpoint has a terminal report or the stop signal is
//! set. Workers are stopped and joined before the aggregator, so every
//! worker record reaches the log file.

pub mod queue;
pub mod worker;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::select;
use serde::Serialize;

use crate::error::Result;
use crate::logging::{self, LogAggregator, RotatingFile};
use crate::models::{CheckTask, Config, TaskOutcome, TaskReport};
use crate::pipeline::Checker;
use crate::storage::{DumpProvider, QuarantineStore};
use crate::utils::StopSignal;

pub use queue::{FeederQueues, TaskQueues, WorkerQueues};
pub use worker::{Worker, WorkerSettings};

/// Source name of the coordinator's own log records.
const COORDINATOR_SOURCE: &str = "auditor";

/// Endpoints grouped by how their checks ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub exhausted: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, report: TaskReport) {
        match report.outcome {
            TaskOutcome::Succeeded => self.succeeded.push(report.rse),
            TaskOutcome::Skipped => self.skipped.push(report.rse),
            TaskOutcome::Exhausted => self.exhausted.push(report.rse),
            TaskOutcome::Retried => {}
        }
    }

    /// Number of endpoints with a terminal outcome.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.exhausted.len()
    }
}

/// Runs consistency checks over a set of endpoints with a worker pool.
pub struct Auditor {
    config: Config,
    checker: Arc<Checker>,
    stop: StopSignal,
}

impl Auditor {
    pub fn new(
        config: Config,
        provider: Arc<dyn DumpProvider>,
        store: Arc<dyn QuarantineStore>,
    ) -> Self {
        let checker = Arc::new(Checker::from_config(&config, provider, store));
        Self {
            config,
            checker,
            stop: StopSignal::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checker(&self) -> &Arc<Checker> {
        &self.checker
    }

    /// Signal that ends the current and any later run early when set.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Check every endpoint in `rses` once, retrying failures.
    pub fn run(&self, rses: &[String]) -> Result<RunSummary> {
        let auditor = &self.config.auditor;
        let poll = auditor.poll_interval();

        let sink = RotatingFile::open(
            &self.config.paths.log_file,
            self.config.logging.max_bytes,
            self.config.logging.backup_count,
        )?;

        let (coordinator_pipe, coordinator_rx) = logging::pipe(COORDINATOR_SOURCE);
        let mut log_sources = vec![coordinator_rx];

        let queues = TaskQueues::new();
        let workers_stop = StopSignal::new();
        let worker_settings = WorkerSettings {
            poll,
            keep_dumps: auditor.keep_dumps,
        };
        let mut workers = Vec::with_capacity(auditor.workers);
        for id in 1..=auditor.workers {
            let (pipe, rx) = logging::pipe(format!("worker-{id}"));
            log_sources.push(rx);
            let worker = Worker::new(
                id,
                Arc::clone(&self.checker),
                queues.worker_ends(),
                workers_stop.clone(),
                worker_settings,
            )
            .with_log_pipe(pipe);
            match thread::Builder::new()
                .name(format!("auditor-worker-{id}"))
                .spawn(move || worker.run())
            {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    workers_stop.set();
                    join_workers(workers);
                    return Err(e.into());
                }
            }
        }

        let log_stop = StopSignal::new();
        let aggregator = LogAggregator::new(log_sources, sink, log_stop.clone(), poll);
        let log_handle = match thread::Builder::new()
            .name("auditor-logger".into())
            .spawn(move || aggregator.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                workers_stop.set();
                join_workers(workers);
                return Err(e.into());
            }
        };

        logging::attach(coordinator_pipe);
        let feeder = Feeder {
            queues: queues.feeder_ends(),
            stop: self.stop.clone(),
            poll,
            backoff: auditor.retry_backoff(),
        };
        let summary = feeder.run(rses, auditor.attempts);
        log::info!(
            "Audit finished: {} succeeded, {} skipped, {} exhausted",
            summary.succeeded.len(),
            summary.skipped.len(),
            summary.exhausted.len()
        );

        workers_stop.set();
        join_workers(workers);
        logging::detach();

        log_stop.set();
        match log_handle.join() {
            Ok(Ok(lines)) => log::debug!("Log aggregator wrote {} lines", lines),
            Ok(Err(e)) => log::error!("Log aggregator failed: {}", e),
            Err(_) => log::error!("Log aggregator panicked"),
        }

        Ok(summary)
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if handle.join().is_err() {
            log::error!("Worker thread panicked");
        }
    }
}

/// Coordinator loop: feeds endpoints, refeeds retries, collects reports.
struct Feeder {
    queues: FeederQueues,
    stop: StopSignal,
    poll: Duration,
    backoff: Duration,
}

impl Feeder {
    fn run(self, rses: &[String], attempts: u32) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut seen = HashSet::new();
        let mut outstanding = 0usize;
        if self.stop.is_set() {
            log::warn!("Stop requested before the run started");
            return summary;
        }

        for rse in rses {
            if !seen.insert(rse.as_str()) {
                continue;
            }
            if self.queues.tasks.send(CheckTask::new(rse.as_str(), attempts)).is_err() {
                log::error!("Task queue closed, cannot feed {}", rse);
                return summary;
            }
            outstanding += 1;
        }
        log::info!("Auditing {} endpoints", outstanding);

        // Backoff is constant, so ready times are in push order.
        let mut delayed: VecDeque<(Instant, CheckTask)> = VecDeque::new();

        while outstanding > 0 && !self.stop.is_set() {
            let now = Instant::now();
            while delayed.front().is_some_and(|(ready, _)| *ready <= now) {
                if let Some((_, task)) = delayed.pop_front() {
                    self.refeed(task);
                }
            }

            let wait = delayed
                .front()
                .map_or(self.poll, |(ready, _)| {
                    ready.saturating_duration_since(now).min(self.poll)
                });

            select! {
                recv(self.queues.retry) -> task => {
                    if let Ok(task) = task {
                        log::debug!(
                            "Requeueing {} in {:?} ({} attempts left)",
                            task.rse,
                            self.backoff,
                            task.attempts
                        );
                        delayed.push_back((Instant::now() + self.backoff, task));
                    }
                }
                recv(self.queues.reports) -> report => {
                    if let Ok(report) = report {
                        if report.outcome.is_terminal() {
                            outstanding -= 1;
                            summary.record(report);
                        }
                    }
                }
                default(wait) => {}
            }
        }

        if outstanding > 0 {
            log::warn!("Stopped with {} endpoints still pending", outstanding);
        }
        summary
    }

    fn refeed(&self, task: CheckTask) {
        let rse = task.rse.clone();
        if self.queues.tasks.send(task).is_err() {
            log::error!("Task queue closed, cannot refeed {}", rse);
        }
    }
}
