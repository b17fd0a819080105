//! Collaborator interfaces for dump acquisition and quarantine persistence.
//!
//! The auditor never reads the catalog directly. It works on dumps:
//!
//! ```text
//! site dump (date D)           catalog snapshot (D - delta)
//!        \                     catalog snapshot (D + delta)
//!         \                   /
//!          +---- diff -------+
//!               |
//!               v
//!       DARK / LOST records  --->  quarantine store (DARK only)
//! ```
//!
//! Downloaded dumps are cached per endpoint under two filename families,
//! see [`CACHE_ARTIFACT_PREFIXES`].

pub mod local;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{DarkReplica, DiffRecord, RseUsage};

// Re-export for convenience
pub use local::{LocalDumps, LocalQuarantine};

/// Cache file prefixes, each followed by `_<rse>_`.
pub const CACHE_ARTIFACT_PREFIXES: [&str; 2] = ["replicafromhdfs", "ddmendpoint"];

/// A site dump downloaded into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDump {
    pub path: PathBuf,
    pub date: NaiveDate,
}

/// A catalog snapshot downloaded into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub path: PathBuf,
    pub date: NaiveDate,
}

/// Inputs of one diff run.
#[derive(Debug, Clone, Copy)]
pub struct DiffInputs<'a> {
    pub rse: &'a str,
    pub dump: &'a SiteDump,
    pub before: &'a CatalogSnapshot,
    pub after: &'a CatalogSnapshot,
    pub cache_dir: &'a Path,
}

/// Lazy, finite, non-restartable sequence of diff records.
pub type DiffStream<'a> = Box<dyn Iterator<Item = Result<DiffRecord>> + 'a>;

/// Source of site dumps, catalog snapshots and their diff.
pub trait DumpProvider: Send + Sync {
    /// Fetch the current site dump for an endpoint into `dest_dir`.
    fn fetch_site_dump(&self, rse: &str, dest_dir: &Path) -> Result<SiteDump>;

    /// Fetch the catalog snapshot of an endpoint as of `date`.
    fn fetch_catalog_snapshot(
        &self,
        rse: &str,
        date: NaiveDate,
        cache_dir: &Path,
    ) -> Result<CatalogSnapshot>;

    /// Diff a site dump against two catalog snapshots bracketing its date.
    ///
    /// `label` names the diff run for the provider's own bookkeeping.
    fn diff<'a>(&'a self, label: &str, inputs: DiffInputs<'a>) -> Result<DiffStream<'a>>;
}

/// Persistence of quarantined replicas and endpoint usage.
pub trait QuarantineStore: Send + Sync {
    /// Record a batch of suspected dark replicas for an endpoint.
    fn add_dark_replicas(&self, rse: &str, replicas: &[DarkReplica]) -> Result<()>;

    /// Endpoint usage as reported by `source`.
    fn get_usage(&self, rse: &str, source: &str) -> Result<RseUsage>;
}
