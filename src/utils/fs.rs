// src/utils/fs.rs

//! Filesystem helpers for result files and the dump cache.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{AuditError, Result};
use crate::storage::CACHE_ARTIFACT_PREFIXES;

/// Create `target` from the bytes produced by `write`.
///
/// Data goes to a temporary file in the target's directory first and is
/// renamed into place only once complete. If `write` fails the temporary
/// file is removed, and an existing `target` is never overwritten.
pub fn write_atomically<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(target)
        .map_err(|e| AuditError::Io(e.error))?;
    Ok(())
}

/// Cache files downloaded for an endpoint.
///
/// Only `{prefix}_{rse}_{YYYYMMDD}` names match, so endpoints whose names
/// extend `rse` past an underscore keep their files.
pub fn cache_artifacts(cache_dir: &Path, rse: &str) -> io::Result<Vec<PathBuf>> {
    let prefixes: Vec<String> = CACHE_ARTIFACT_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}_{rse}_"))
        .collect();
    let owned = |name: &str| {
        prefixes.iter().any(|prefix| {
            name.strip_prefix(prefix.as_str())
                .is_some_and(|date| NaiveDate::parse_from_str(date, "%Y%m%d").is_ok())
        })
    };

    let mut artifacts: Vec<PathBuf> = fs::read_dir(cache_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().is_some_and(|name| owned(name)))
        .map(|entry| entry.path())
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

/// Remove an endpoint's cache files, returning the ones removed.
///
/// Failures are logged and skipped.
pub fn purge_cache(cache_dir: &Path, rse: &str) -> Vec<PathBuf> {
    let artifacts = match cache_artifacts(cache_dir, rse) {
        Ok(artifacts) => artifacts,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("Cannot list cache {}: {}", cache_dir.display(), e);
            return Vec::new();
        }
    };
    log::debug!("Removing: {:?}", artifacts);

    artifacts
        .into_iter()
        .filter(|path| match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to remove {}: {}", path.display(), e);
                false
            }
        })
        .collect()
}
