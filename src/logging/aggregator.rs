// src/logging/aggregator.rs

//! Multiplexes worker log channels into one rotating file.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, TryRecvError};

use crate::error::Result;
use crate::logging::rotate::RotatingFile;
use crate::utils::StopSignal;

/// A formatted log line and the worker that emitted it.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub source: Arc<str>,
    pub line: String,
}

/// Single writer of the log file.
///
/// Lines from one source keep their emission order; lines from
/// different sources interleave arbitrarily.
pub struct LogAggregator {
    sources: Vec<Receiver<LogRecord>>,
    sink: RotatingFile,
    stop: StopSignal,
    poll: Duration,
}

impl LogAggregator {
    pub fn new(
        sources: Vec<Receiver<LogRecord>>,
        sink: RotatingFile,
        stop: StopSignal,
        poll: Duration,
    ) -> Self {
        Self {
            sources,
            sink,
            stop,
            poll,
        }
    }

    /// Copy records into the sink until stopped or every source is closed.
    ///
    /// Records still queued when the stop signal is seen are written
    /// before returning. Lines the sink rejects are reported and skipped.
    /// Returns the number of lines written.
    pub fn run(mut self) -> Result<usize> {
        let mut written = 0;

        while !self.stop.is_set() && !self.sources.is_empty() {
            let ready = {
                let mut select = Select::new();
                for source in &self.sources {
                    select.recv(source);
                }
                select.ready_timeout(self.poll)
            };
            let Ok(index) = ready else {
                continue;
            };

            match self.sources[index].try_recv() {
                Ok(record) => {
                    written += usize::from(self.write(&record));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.sources.swap_remove(index);
                }
            }
        }

        written += self.drain();
        self.sink.flush()?;
        Ok(written)
    }

    fn drain(&mut self) -> usize {
        let mut written = 0;
        for index in 0..self.sources.len() {
            while let Ok(record) = self.sources[index].try_recv() {
                written += usize::from(self.write(&record));
            }
        }
        written
    }

    /// Write one record; a failed write loses that line only.
    fn write(&mut self, record: &LogRecord) -> bool {
        match self.sink.write_line(&record.line) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Cannot write log line from {} to {}: {}",
                    record.source,
                    self.sink.path().display(),
                    e
                );
                false
            }
        }
    }
}
