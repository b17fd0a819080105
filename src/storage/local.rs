//! Local filesystem collaborators.
//!
//! Stand-ins for the grid services so the daemon can audit endpoints from
//! plain files, for development and testing.
//!
//! ## Storage Layout
//!
//! ```text
//! {dumps_dir}/
//! └── {rse}_{YYYYMMDD}        # Site dump: one relative path per line
//! {catalog_dir}/
//! └── {rse}_{YYYYMMDD}        # Catalog snapshot: one relative path per line
//! {quarantine_dir}/
//! ├── {rse}.jsonl             # Quarantined replicas, appended per batch
//! └── usage/
//!     └── {rse}.json          # [{"source": "rucio", "files": 1000}]
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::models::{DarkReplica, DiffRecord, Label, RseUsage};
use crate::storage::{
    CACHE_ARTIFACT_PREFIXES, CatalogSnapshot, DiffInputs, DiffStream, DumpProvider,
    QuarantineStore, SiteDump,
};

const DATE_FORMAT: &str = "%Y%m%d";

fn dated_name(rse: &str, date: NaiveDate) -> String {
    format!("{}_{}", rse, date.format(DATE_FORMAT))
}

/// Site dumps and catalog snapshots read from local directories.
#[derive(Debug, Clone)]
pub struct LocalDumps {
    dumps_dir: PathBuf,
    catalog_dir: PathBuf,
}

impl LocalDumps {
    pub fn new(dumps_dir: impl Into<PathBuf>, catalog_dir: impl Into<PathBuf>) -> Self {
        Self {
            dumps_dir: dumps_dir.into(),
            catalog_dir: catalog_dir.into(),
        }
    }

    /// Endpoints with at least one site dump, sorted and deduplicated.
    pub fn endpoints(&self) -> Result<Vec<String>> {
        let mut rses: Vec<String> = fs::read_dir(&self.dumps_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                let (rse, date) = name.rsplit_once('_')?;
                NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
                Some(rse.to_string())
            })
            .collect();
        rses.sort();
        rses.dedup();
        Ok(rses)
    }

    /// Newest site dump date available for an endpoint.
    fn latest_dump_date(&self, rse: &str) -> Result<Option<NaiveDate>> {
        let prefix = format!("{rse}_");
        let latest = fs::read_dir(&self.dumps_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                let date = name.strip_prefix(&prefix)?;
                NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
            })
            .max();
        Ok(latest)
    }

    /// Copy a source file into the cache under a prefixed name.
    fn cache_copy(source: &Path, cache_dir: &Path, prefix: &str, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(cache_dir)?;
        let destination = cache_dir.join(format!("{prefix}_{name}"));
        fs::copy(source, &destination)?;
        Ok(destination)
    }
}

impl DumpProvider for LocalDumps {
    fn fetch_site_dump(&self, rse: &str, dest_dir: &Path) -> Result<SiteDump> {
        let date = self.latest_dump_date(rse)?.ok_or_else(|| {
            AuditError::dump(
                rse,
                format!("no site dump found in {}", self.dumps_dir.display()),
            )
        })?;

        let name = dated_name(rse, date);
        log::debug!("Fetching site dump {} into {}", name, dest_dir.display());
        let path = Self::cache_copy(
            &self.dumps_dir.join(&name),
            dest_dir,
            CACHE_ARTIFACT_PREFIXES[1],
            &name,
        )?;

        Ok(SiteDump { path, date })
    }

    fn fetch_catalog_snapshot(
        &self,
        rse: &str,
        date: NaiveDate,
        cache_dir: &Path,
    ) -> Result<CatalogSnapshot> {
        let name = dated_name(rse, date);
        let source = self.catalog_dir.join(&name);
        if !source.exists() {
            return Err(AuditError::dump(
                rse,
                format!("no catalog snapshot at {}", source.display()),
            ));
        }

        log::debug!("Fetching catalog snapshot {}", name);
        let path = Self::cache_copy(&source, cache_dir, CACHE_ARTIFACT_PREFIXES[0], &name)?;
        Ok(CatalogSnapshot { path, date })
    }

    fn diff<'a>(&'a self, label: &str, inputs: DiffInputs<'a>) -> Result<DiffStream<'a>> {
        log::debug!(
            "Running {} diff for {} (dump dated {}, snapshots {} / {})",
            label,
            inputs.rse,
            inputs.dump.date,
            inputs.before.date,
            inputs.after.date
        );

        let before = read_entries(&inputs.before.path)?;
        let after = read_entries(&inputs.after.path)?;
        let dump = BufReader::new(File::open(&inputs.dump.path)?);

        Ok(Box::new(ConsistencyDiff::new(dump.lines(), before, after)))
    }
}

/// Read a dump into a set of entries, ignoring blank lines.
fn read_entries(path: &Path) -> Result<HashSet<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        let entry = line.trim();
        if !entry.is_empty() {
            entries.insert(entry.to_string());
        }
    }
    Ok(entries)
}

/// Streams DARK entries while reading the site dump, then LOST entries.
///
/// DARK: in the site dump, in neither snapshot.
/// LOST: in both snapshots, not in the site dump.
struct ConsistencyDiff<R> {
    lines: Option<Lines<R>>,
    before: HashSet<String>,
    after: HashSet<String>,
    seen: HashSet<String>,
    lost: Option<std::vec::IntoIter<String>>,
}

impl<R: BufRead> ConsistencyDiff<R> {
    fn new(lines: Lines<R>, before: HashSet<String>, after: HashSet<String>) -> Self {
        Self {
            lines: Some(lines),
            before,
            after,
            seen: HashSet::new(),
            lost: None,
        }
    }
}

impl<R: BufRead> Iterator for ConsistencyDiff<R> {
    type Item = Result<DiffRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(lines) = self.lines.as_mut() {
            for line in lines.by_ref() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(e.into())),
                };
                let entry = line.trim();
                if entry.is_empty() {
                    continue;
                }
                let dark = !self.before.contains(entry) && !self.after.contains(entry);
                self.seen.insert(entry.to_string());
                if dark {
                    return Some(Ok(DiffRecord::new(Label::Dark, entry)));
                }
            }

            self.lines = None;
            let mut lost: Vec<String> = self
                .before
                .iter()
                .filter(|path| self.after.contains(*path) && !self.seen.contains(*path))
                .cloned()
                .collect();
            lost.sort();
            self.lost = Some(lost.into_iter());
        }

        self.lost
            .as_mut()?
            .next()
            .map(|path| Ok(DiffRecord::new(Label::Lost, path)))
    }
}

/// One usage figure as stored in `usage/{rse}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UsageEntry {
    source: String,
    files: u64,
}

/// Quarantined replicas and endpoint usage kept in local files.
#[derive(Debug, Clone)]
pub struct LocalQuarantine {
    root: PathBuf,
}

impl LocalQuarantine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn replicas_path(&self, rse: &str) -> PathBuf {
        self.root.join(format!("{rse}.jsonl"))
    }

    fn usage_path(&self, rse: &str) -> PathBuf {
        self.root.join("usage").join(format!("{rse}.json"))
    }

    /// All replicas quarantined so far for an endpoint.
    pub fn quarantined(&self, rse: &str) -> Result<Vec<DarkReplica>> {
        let path = self.replicas_path(rse);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut replicas = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                replicas.push(serde_json::from_str(&line)?);
            }
        }
        Ok(replicas)
    }

    /// Set the file count reported by `source` for an endpoint.
    pub fn record_usage(&self, rse: &str, source: &str, files: u64) -> Result<()> {
        let path = self.usage_path(rse);
        let mut entries: Vec<UsageEntry> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(AuditError::Io(e)),
        };
        entries.retain(|entry| entry.source != source);
        entries.push(UsageEntry {
            source: source.to_string(),
            files,
        });

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }
}

impl QuarantineStore for LocalQuarantine {
    fn add_dark_replicas(&self, rse: &str, replicas: &[DarkReplica]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.replicas_path(rse))?;

        let mut writer = BufWriter::new(file);
        for replica in replicas {
            serde_json::to_writer(&mut writer, replica)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        log::debug!("Quarantined {} replicas for {}", replicas.len(), rse);
        Ok(())
    }

    fn get_usage(&self, rse: &str, source: &str) -> Result<RseUsage> {
        let path = self.usage_path(rse);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuditError::quarantine(
                    rse,
                    format!("no usage recorded at {}", path.display()),
                ));
            }
            Err(e) => return Err(AuditError::Io(e)),
        };

        let entries: Vec<UsageEntry> = serde_json::from_slice(&bytes)?;
        entries
            .into_iter()
            .find(|entry| entry.source == source)
            .map(|entry| RseUsage { files: entry.files })
            .ok_or_else(|| AuditError::quarantine(rse, format!("no usage from source {source}")))
    }
}
