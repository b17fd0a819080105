// src/pipeline/output.rs

//! Post-check actions on a result file.
//!
//! DARK files are put in quarantine so that a separate reaper may delete
//! them. LOST files are counted but not acted upon yet.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AuditError, Result};
use crate::logging::CRITICAL_TARGET;
use crate::models::{AuditorConfig, DarkReplica, DiffRecord, Label, ResultFile};
use crate::pipeline::compress::compress_file;
use crate::pipeline::sanity::SanityGuard;
use crate::storage::QuarantineStore;

/// Options controlling post-check actions.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub threshold: f64,
    pub sanity_check: bool,
    pub compress: bool,
    /// Usage source for the endpoint file count
    pub usage_source: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::from(&AuditorConfig::default())
    }
}

impl From<&AuditorConfig> for OutputOptions {
    fn from(config: &AuditorConfig) -> Self {
        Self {
            threshold: config.threshold,
            sanity_check: config.sanity_check,
            compress: config.compress,
            usage_source: config.usage_source.clone(),
        }
    }
}

/// What processing a result file did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSummary {
    pub rse: String,
    pub dark: usize,
    pub lost: usize,
    /// Compressed result, when compression is enabled
    pub compressed: Option<PathBuf>,
}

/// Labeled content of a result file.
#[derive(Debug, Default)]
struct ParsedResult {
    dark: Vec<DarkReplica>,
    lost: usize,
}

/// Turns result files into quarantine submissions.
pub struct OutputProcessor {
    store: Arc<dyn QuarantineStore>,
    options: OutputOptions,
}

impl OutputProcessor {
    pub fn new(store: Arc<dyn QuarantineStore>, options: OutputOptions) -> Self {
        Self { store, options }
    }

    /// Quarantine the DARK files listed in `path`, then compress it.
    ///
    /// `path` must keep the `<rse>_<YYYYMMDD>` naming. Nothing is
    /// submitted when parsing fails or the sanity guard rejects the file.
    pub fn process(&self, path: &Path) -> Result<OutputSummary> {
        // Unknown content in our own result file is a bug, not a transient failure.
        let parsed = parse_result(path).inspect_err(|e| {
            log::error!(target: CRITICAL_TARGET, "Error processing {}: {}", path.display(), e)
        })?;

        let result = ResultFile::from_path(path)?;
        let rse = result.rse();
        let usage = self.store.get_usage(rse, &self.options.usage_source)?;

        SanityGuard::new(self.options.threshold, self.options.sanity_check).validate(
            rse,
            parsed.dark.len(),
            &usage,
        )?;

        self.store.add_dark_replicas(rse, &parsed.dark)?;
        log::debug!(
            "Processed {} DARK files from {} ({} LOST ignored)",
            parsed.dark.len(),
            path.display(),
            parsed.lost
        );

        let compressed = if self.options.compress {
            let destination = compress_file(path)?;
            log::debug!("Compressed {}", destination.display());
            Some(destination)
        } else {
            None
        };

        Ok(OutputSummary {
            rse: rse.to_string(),
            dark: parsed.dark.len(),
            lost: parsed.lost,
            compressed,
        })
    }
}

/// Parse every `LABEL,path` line; any other content is fatal.
fn parse_result(path: &Path) -> Result<ParsedResult> {
    let reader = BufReader::new(File::open(path)?);
    let mut parsed = ParsedResult::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let record = DiffRecord::parse_line(&line).map_err(|reason| AuditError::MalformedResult {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        })?;

        match record.label {
            Label::Dark => parsed.dark.push(DarkReplica::from_path(record.path)),
            // TODO: declare LOST files as suspicious replicas.
            Label::Lost => parsed.lost += 1,
        }
    }

    Ok(parsed)
}
