// src/logging/mod.rs

//! Logging with per-worker channels.
//!
//! Every record goes through the `log` facade. [`LogRouter`] is installed
//! once as the global logger; a thread that has attached a [`LogPipe`]
//! sends its formatted records down that pipe to the [`LogAggregator`],
//! which owns the log file. Other threads log to stderr.

pub mod aggregator;
pub mod rotate;

use std::cell::RefCell;
use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::error::{AuditError, Result};

pub use aggregator::{LogAggregator, LogRecord};
pub use rotate::RotatingFile;

/// Target for records of critical severity, logged at error level.
pub const CRITICAL_TARGET: &str = "auditor::critical";

thread_local! {
    static PIPE: RefCell<Option<LogPipe>> = const { RefCell::new(None) };
}

/// Sending half of one worker's log channel.
#[derive(Debug, Clone)]
pub struct LogPipe {
    source: Arc<str>,
    tx: Sender<LogRecord>,
}

impl LogPipe {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Send a formatted line; false once the aggregator is gone.
    pub fn send(&self, line: String) -> bool {
        self.tx
            .send(LogRecord {
                source: Arc::clone(&self.source),
                line,
            })
            .is_ok()
    }
}

/// Create a log channel for `source`.
pub fn pipe(source: impl Into<String>) -> (LogPipe, Receiver<LogRecord>) {
    let (tx, rx) = unbounded();
    let pipe = LogPipe {
        source: Arc::from(source.into()),
        tx,
    };
    (pipe, rx)
}

/// Route the current thread's records through `pipe`.
pub fn attach(pipe: LogPipe) {
    PIPE.with(|slot| *slot.borrow_mut() = Some(pipe));
}

/// Stop routing the current thread's records, closing its pipe.
pub fn detach() -> Option<LogPipe> {
    PIPE.with(|slot| slot.borrow_mut().take())
}

/// Parse a level name, defaulting to DEBUG.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Debug,
    }
}

fn level_label(record: &Record) -> &'static str {
    if record.target() == CRITICAL_TARGET {
        return "CRITICAL";
    }
    match record.level() {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Format a record as one log file line.
pub fn format_record(record: &Record, source: &str) -> String {
    format!(
        "{}  {:<22}  {:<8} [{:>12}] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        record.target(),
        level_label(record),
        source,
        record.args()
    )
}

/// Global logger dispatching each record to its thread's pipe.
pub struct LogRouter {
    level: LevelFilter,
    fallback: env_logger::Logger,
}

impl LogRouter {
    pub fn new(level: LevelFilter) -> Self {
        let fallback = env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp_secs()
            .build();
        Self { level, fallback }
    }
}

impl Log for LogRouter {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let sent = PIPE
            .try_with(|slot| match slot.borrow().as_ref() {
                Some(pipe) => pipe.send(format_record(record, pipe.source())),
                None => false,
            })
            .unwrap_or(false);

        if !sent {
            self.fallback.log(record);
        }
    }

    fn flush(&self) {
        self.fallback.flush();
    }
}

/// Install the router as the global logger.
pub fn init(level: &str) -> Result<()> {
    let level = parse_level(level);
    log::set_boxed_logger(Box::new(LogRouter::new(level)))
        .map_err(|e| AuditError::config(format!("logger already installed: {e}")))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("warning"), LevelFilter::Warn);
        assert_eq!(parse_level("CRITICAL"), LevelFilter::Error);
        assert_eq!(parse_level("unknown"), LevelFilter::Debug);
    }

    #[test]
    fn test_format_record_columns() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("Checking E1"))
                .level(Level::Info)
                .target("auditor::daemon")
                .build(),
            "worker-1",
        );
        assert!(line.contains("  auditor::daemon         INFO     [    worker-1] Checking E1"));
    }

    #[test]
    fn test_critical_target_label() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("bad file"))
                .level(Level::Error)
                .target(CRITICAL_TARGET)
                .build(),
            "worker-1",
        );
        assert!(line.contains("CRITICAL"));
    }

    #[test]
    fn test_router_uses_attached_pipe() {
        let router = LogRouter::new(LevelFilter::Info);
        let (pipe, rx) = pipe("worker-7");
        attach(pipe);

        router.log(
            &Record::builder()
                .args(format_args!("routed"))
                .level(Level::Info)
                .target("auditor")
                .build(),
        );
        router.log(
            &Record::builder()
                .args(format_args!("filtered"))
                .level(Level::Debug)
                .target("auditor")
                .build(),
        );

        let record = rx.try_recv().unwrap();
        assert_eq!(&*record.source, "worker-7");
        assert!(record.line.ends_with("routed"));
        assert!(rx.try_recv().is_err());

        assert!(detach().is_some());
        assert!(detach().is_none());
    }
}
