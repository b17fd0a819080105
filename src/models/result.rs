// src/models/result.rs

//! Result file naming: `<rse>_<YYYYMMDD>` under the results directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{AuditError, Result};

/// Suffix appended to compressed result files.
pub const COMPRESSED_SUFFIX: &str = ".gz";

const DATE_FORMAT: &str = "%Y%m%d";

/// The result of one consistency check, keyed by endpoint and dump date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    rse: String,
    date: NaiveDate,
    path: PathBuf,
}

impl ResultFile {
    /// Canonical result location for an endpoint and dump date.
    pub fn new(results_dir: impl AsRef<Path>, rse: impl Into<String>, date: NaiveDate) -> Self {
        let rse = rse.into();
        let path = results_dir
            .as_ref()
            .join(format!("{}_{}", rse, date.format(DATE_FORMAT)));
        Self { rse, date, path }
    }

    /// Recover endpoint and date from an uncompressed result path.
    ///
    /// The endpoint is everything before the last underscore of the file
    /// name, so endpoint names may themselves contain underscores.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let invalid = || AuditError::InvalidResultName(path.clone());

        let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let (rse, date) = file_name.rsplit_once('_').ok_or_else(invalid)?;
        if rse.is_empty() {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?;

        Ok(Self {
            rse: rse.to_string(),
            date,
            path,
        })
    }

    pub fn rse(&self) -> &str {
        &self.rse
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the compressed form of this result.
    pub fn compressed_path(&self) -> PathBuf {
        compressed_path(&self.path)
    }

    /// Whether the plain or compressed result is already on disk.
    pub fn exists(&self) -> bool {
        self.path.exists() || self.compressed_path().exists()
    }
}

/// Append the compression suffix to a path.
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn canonical_name() {
        let result = ResultFile::new("/results", "E1", date(2024, 1, 10));
        assert_eq!(result.path(), Path::new("/results/E1_20240110"));
        assert_eq!(
            result.compressed_path(),
            PathBuf::from("/results/E1_20240110.gz")
        );
    }

    #[test]
    fn from_path_uses_last_underscore() {
        let result = ResultFile::from_path("/results/CERN-PROD_DATADISK_20240110").unwrap();
        assert_eq!(result.rse(), "CERN-PROD_DATADISK");
        assert_eq!(result.date(), date(2024, 1, 10));
    }

    #[test]
    fn from_path_rejects_bad_names() {
        assert!(matches!(
            ResultFile::from_path("/results/nodate"),
            Err(AuditError::InvalidResultName(_))
        ));
        assert!(ResultFile::from_path("/results/E1_notadate").is_err());
        assert!(ResultFile::from_path("/results/_20240110").is_err());
    }

    #[test]
    fn exists_checks_both_forms() {
        let tmp = TempDir::new().unwrap();
        let result = ResultFile::new(tmp.path(), "E1", date(2024, 1, 10));
        assert!(!result.exists());

        std::fs::write(result.compressed_path(), b"").unwrap();
        assert!(result.exists());

        std::fs::remove_file(result.compressed_path()).unwrap();
        std::fs::write(result.path(), b"").unwrap();
        assert!(result.exists());
    }
}
