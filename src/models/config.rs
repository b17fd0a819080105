//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Audit behavior settings
    #[serde(default)]
    pub auditor: AuditorConfig,

    /// Settings shared with the other daemons
    #[serde(default)]
    pub common: CommonConfig,

    /// Working directories and files
    #[serde(default)]
    pub paths: PathsConfig,

    /// Rotating log file bounds
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Filesystem-backed collaborators
    #[serde(default)]
    pub local: LocalConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.auditor.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AuditError::validation(format!(
                "auditor.threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.auditor.workers == 0 {
            return Err(AuditError::validation("auditor.workers must be > 0"));
        }
        if self.auditor.poll_interval_secs == 0 {
            return Err(AuditError::validation(
                "auditor.poll_interval_secs must be > 0",
            ));
        }
        if self.auditor.usage_source.trim().is_empty() {
            return Err(AuditError::validation("auditor.usage_source is empty"));
        }
        for (name, path) in [
            ("paths.cache_dir", &self.paths.cache_dir),
            ("paths.results_dir", &self.paths.results_dir),
            ("paths.log_file", &self.paths.log_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(AuditError::validation(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}

/// Audit behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditorConfig {
    /// Maximum ratio of DARK files to known endpoint files
    #[serde(default = "defaults::threshold")]
    pub threshold: f64,

    /// Days between the site dump and each bracketing catalog snapshot
    #[serde(default = "defaults::delta_in_days")]
    pub delta_in_days: u64,

    /// Keep downloaded dumps in the cache after a check
    #[serde(default)]
    pub keep_dumps: bool,

    /// Number of concurrent workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Retries granted to each endpoint after its first attempt
    #[serde(default = "defaults::attempts")]
    pub attempts: u32,

    /// Bounded wait on queues before re-checking the stop signal
    #[serde(default = "defaults::poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before a failed endpoint is fed back to the workers
    #[serde(default)]
    pub retry_backoff_secs: u64,

    /// Abort quarantine when DARK files exceed the threshold
    #[serde(default = "defaults::enabled")]
    pub sanity_check: bool,

    /// Compress result files once processed
    #[serde(default = "defaults::enabled")]
    pub compress: bool,

    /// Usage source consulted for the endpoint file count
    #[serde(default = "defaults::usage_source")]
    pub usage_source: String,
}

impl AuditorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::threshold(),
            delta_in_days: defaults::delta_in_days(),
            keep_dumps: false,
            workers: defaults::workers(),
            attempts: defaults::attempts(),
            poll_interval_secs: defaults::poll_interval_secs(),
            retry_backoff_secs: 0,
            sanity_check: defaults::enabled(),
            compress: defaults::enabled(),
            usage_source: defaults::usage_source(),
        }
    }
}

/// Settings shared with the other daemons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Log level name (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[serde(default = "defaults::loglevel")]
    pub loglevel: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            loglevel: defaults::loglevel(),
        }
    }
}

/// Working directories and files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "defaults::results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "defaults::log_file")]
    pub log_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: defaults::cache_dir(),
            results_dir: defaults::results_dir(),
            log_file: defaults::log_file(),
        }
    }
}

/// Rotating log file bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Roll the log file over once it would exceed this size (0 disables)
    #[serde(default = "defaults::max_bytes")]
    pub max_bytes: u64,

    /// Number of rolled-over files to keep
    #[serde(default = "defaults::backup_count")]
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_bytes: defaults::max_bytes(),
            backup_count: defaults::backup_count(),
        }
    }
}

/// Directories used by the filesystem-backed collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Site dumps named `<rse>_<YYYYMMDD>`
    #[serde(default = "defaults::dumps_dir")]
    pub dumps_dir: PathBuf,

    /// Catalog snapshots named `<rse>_<YYYYMMDD>`
    #[serde(default = "defaults::catalog_dir")]
    pub catalog_dir: PathBuf,

    /// Quarantined replicas and endpoint usage
    #[serde(default = "defaults::quarantine_dir")]
    pub quarantine_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dumps_dir: defaults::dumps_dir(),
            catalog_dir: defaults::catalog_dir(),
            quarantine_dir: defaults::quarantine_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Auditor defaults
    pub fn threshold() -> f64 {
        0.2
    }
    pub fn delta_in_days() -> u64 {
        3
    }
    pub fn workers() -> usize {
        1
    }
    pub fn attempts() -> u32 {
        3
    }
    pub fn poll_interval_secs() -> u64 {
        30
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn usage_source() -> String {
        "rucio".into()
    }

    // Common defaults
    pub fn loglevel() -> String {
        "DEBUG".into()
    }

    // Path defaults
    pub fn cache_dir() -> PathBuf {
        "storage/cache".into()
    }
    pub fn results_dir() -> PathBuf {
        "storage/results".into()
    }
    pub fn log_file() -> PathBuf {
        "storage/auditor.log".into()
    }

    // Log rotation defaults
    pub fn max_bytes() -> u64 {
        20 * 1024 * 1024
    }
    pub fn backup_count() -> usize {
        10
    }

    // Local collaborator defaults
    pub fn dumps_dir() -> PathBuf {
        "storage/dumps".into()
    }
    pub fn catalog_dir() -> PathBuf {
        "storage/catalog".into()
    }
    pub fn quarantine_dir() -> PathBuf {
        "storage/quarantine".into()
    }
}
