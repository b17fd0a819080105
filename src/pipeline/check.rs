// src/pipeline/check.rs

//! Per-endpoint consistency check.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::error::{AuditError, Result};
use crate::models::{Config, ResultFile};
use crate::pipeline::output::{OutputOptions, OutputProcessor, OutputSummary};
use crate::storage::{DiffInputs, DumpProvider, QuarantineStore};
use crate::utils::fs::write_atomically;

/// Name given to diff runs started by the auditor.
pub const DIFF_LABEL: &str = "consistency-manual";

/// Settings of the check pipeline.
#[derive(Debug, Clone)]
pub struct CheckSettings {
    /// Distance between the dump date and each catalog snapshot
    pub delta: Days,
    pub cache_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl From<&Config> for CheckSettings {
    fn from(config: &Config) -> Self {
        Self {
            delta: Days::new(config.auditor.delta_in_days),
            cache_dir: config.paths.cache_dir.clone(),
            results_dir: config.paths.results_dir.clone(),
        }
    }
}

/// What a successful check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A result for this dump date already exists
    Skipped,
    /// New result produced and processed
    Processed(OutputSummary),
}

/// Runs the consistency check and the output processing for endpoints.
pub struct Checker {
    provider: Arc<dyn DumpProvider>,
    output: OutputProcessor,
    settings: CheckSettings,
}

impl Checker {
    pub fn new(
        provider: Arc<dyn DumpProvider>,
        store: Arc<dyn QuarantineStore>,
        settings: CheckSettings,
        options: OutputOptions,
    ) -> Self {
        Self {
            provider,
            output: OutputProcessor::new(store, options),
            settings,
        }
    }

    /// Build a checker from the loaded configuration.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn DumpProvider>,
        store: Arc<dyn QuarantineStore>,
    ) -> Self {
        Self::new(
            provider,
            store,
            CheckSettings::from(config),
            OutputOptions::from(&config.auditor),
        )
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    /// Check an endpoint end to end.
    pub fn check(&self, rse: &str) -> Result<CheckOutcome> {
        log::debug!("Checking {}", rse);
        match self.consistency(rse)? {
            Some(result) => self.output.process(result.path()).map(CheckOutcome::Processed),
            None => Ok(CheckOutcome::Skipped),
        }
    }

    /// Re-run output processing on an existing result file.
    pub fn process_output(&self, path: &Path) -> Result<OutputSummary> {
        self.output.process(path)
    }

    /// Diff the endpoint's current site dump against the catalog.
    ///
    /// Returns the new result file, or `None` when the endpoint was already
    /// checked for this dump date. Collaborator errors propagate unchanged.
    pub fn consistency(&self, rse: &str) -> Result<Option<ResultFile>> {
        let CheckSettings {
            delta,
            cache_dir,
            results_dir,
        } = &self.settings;

        let dump = self.provider.fetch_site_dump(rse, cache_dir)?;
        let result = ResultFile::new(results_dir, rse, dump.date);

        if result.exists() {
            log::warn!(
                "Consistency check for {} (dump dated {}) already done, skipping check",
                rse,
                dump.date.format("%Y%m%d")
            );
            return Ok(None);
        }

        let before_date = shift(rse, dump.date, *delta, NaiveDate::checked_sub_days)?;
        let after_date = shift(rse, dump.date, *delta, NaiveDate::checked_add_days)?;
        let before = self
            .provider
            .fetch_catalog_snapshot(rse, before_date, cache_dir)?;
        let after = self
            .provider
            .fetch_catalog_snapshot(rse, after_date, cache_dir)?;

        let records = self.provider.diff(
            DIFF_LABEL,
            DiffInputs {
                rse,
                dump: &dump,
                before: &before,
                after: &after,
                cache_dir,
            },
        )?;

        write_atomically(result.path(), |out| {
            for record in records {
                writeln!(out, "{}", record?.csv())?;
            }
            Ok(())
        })?;

        Ok(Some(result))
    }
}

fn shift(
    rse: &str,
    date: NaiveDate,
    delta: Days,
    op: fn(NaiveDate, Days) -> Option<NaiveDate>,
) -> Result<NaiveDate> {
    op(date, delta).ok_or_else(|| AuditError::dump(rse, format!("date {date} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use crate::models::{DarkReplica, DiffRecord, Label, RseUsage};
    use crate::storage::{CatalogSnapshot, DiffStream, SiteDump};

    /// Provider serving a fixed dump date and diff, counting diff runs.
    struct FakeProvider {
        date: NaiveDate,
        records: Vec<DiffRecord>,
        diffs: AtomicUsize,
        snapshot_dates: Mutex<Vec<NaiveDate>>,
        fail_mid_diff: bool,
    }

    impl FakeProvider {
        fn new(date: NaiveDate, records: Vec<DiffRecord>) -> Self {
            Self {
                date,
                records,
                diffs: AtomicUsize::new(0),
                snapshot_dates: Mutex::new(Vec::new()),
                fail_mid_diff: false,
            }
        }
    }

    impl DumpProvider for FakeProvider {
        fn fetch_site_dump(&self, rse: &str, dest_dir: &Path) -> Result<SiteDump> {
            Ok(SiteDump {
                path: dest_dir.join(format!("ddmendpoint_{rse}")),
                date: self.date,
            })
        }

        fn fetch_catalog_snapshot(
            &self,
            rse: &str,
            date: NaiveDate,
            cache_dir: &Path,
        ) -> Result<CatalogSnapshot> {
            self.snapshot_dates.lock().unwrap().push(date);
            Ok(CatalogSnapshot {
                path: cache_dir.join(format!("replicafromhdfs_{rse}")),
                date,
            })
        }

        fn diff<'a>(&'a self, _label: &str, _inputs: DiffInputs<'a>) -> Result<DiffStream<'a>> {
            self.diffs.fetch_add(1, Ordering::SeqCst);
            let records = self.records.iter().cloned().map(Ok);
            if self.fail_mid_diff {
                let failure = std::iter::once(Err(AuditError::dump("E1", "stream broken")));
                Ok(Box::new(records.chain(failure)))
            } else {
                Ok(Box::new(records))
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        usage: HashMap<String, u64>,
        batches: Mutex<Vec<Vec<DarkReplica>>>,
    }

    impl QuarantineStore for MemoryStore {
        fn add_dark_replicas(&self, _rse: &str, replicas: &[DarkReplica]) -> Result<()> {
            self.batches.lock().unwrap().push(replicas.to_vec());
            Ok(())
        }

        fn get_usage(&self, rse: &str, _source: &str) -> Result<RseUsage> {
            self.usage
                .get(rse)
                .map(|&files| RseUsage { files })
                .ok_or_else(|| AuditError::quarantine(rse, "unknown endpoint"))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn settings(tmp: &TempDir) -> CheckSettings {
        CheckSettings {
            delta: Days::new(3),
            cache_dir: tmp.path().join("cache"),
            results_dir: tmp.path().join("results"),
        }
    }

    fn scenario_records() -> Vec<DiffRecord> {
        vec![
            DiffRecord::new(Label::Dark, "/data/a.root"),
            DiffRecord::new(Label::Lost, "/data/b.root"),
        ]
    }

    fn checker(
        tmp: &TempDir,
        provider: &Arc<FakeProvider>,
        store: &Arc<MemoryStore>,
    ) -> Checker {
        Checker::new(
            provider.clone(),
            store.clone(),
            settings(tmp),
            OutputOptions::default(),
        )
    }

    #[test]
    fn consistency_writes_csv_and_brackets_snapshots() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new(date(2024, 1, 10), scenario_records()));
        let store = Arc::new(MemoryStore::default());

        let result = checker(&tmp, &provider, &store)
            .consistency("E1")
            .unwrap()
            .unwrap();

        assert_eq!(result.path(), tmp.path().join("results/E1_20240110"));
        assert_eq!(
            fs::read_to_string(result.path()).unwrap(),
            "DARK,/data/a.root\nLOST,/data/b.root\n"
        );
        assert_eq!(
            *provider.snapshot_dates.lock().unwrap(),
            vec![date(2024, 1, 7), date(2024, 1, 13)]
        );
    }

    #[test]
    fn second_check_skips_without_diffing() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new(date(2024, 1, 10), scenario_records()));
        let store = Arc::new(MemoryStore {
            usage: HashMap::from([("E1".to_string(), 100)]),
            ..MemoryStore::default()
        });
        let checker = checker(&tmp, &provider, &store);

        assert!(matches!(checker.check("E1").unwrap(), CheckOutcome::Processed(_)));
        // The compressed form alone must be enough to skip.
        assert!(!tmp.path().join("results/E1_20240110").exists());
        assert!(matches!(checker.check("E1").unwrap(), CheckOutcome::Skipped));

        assert_eq!(provider.diffs.load(Ordering::SeqCst), 1);
        assert_eq!(store.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn end_to_end_single_dark_record() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(FakeProvider::new(date(2024, 1, 10), scenario_records()));
        let store = Arc::new(MemoryStore {
            usage: HashMap::from([("E1".to_string(), 100)]),
            ..MemoryStore::default()
        });

        let outcome = checker(&tmp, &provider, &store).check("E1").unwrap();

        let CheckOutcome::Processed(summary) = outcome else {
            panic!("expected a processed result, got {outcome:?}");
        };
        assert_eq!(summary.dark, 1);
        assert_eq!(summary.lost, 1);
        assert_eq!(
            store.batches.lock().unwrap()[0],
            vec![DarkReplica {
                path: "/data/a.root".into(),
                scope: Some("data".into()),
                name: "a.root".into(),
            }]
        );
        assert!(tmp.path().join("results/E1_20240110.gz").exists());
    }

    #[test]
    fn interrupted_diff_leaves_no_result() {
        let tmp = TempDir::new().unwrap();
        let mut provider = FakeProvider::new(date(2024, 1, 10), scenario_records());
        provider.fail_mid_diff = true;
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryStore::default());

        let err = checker(&tmp, &provider, &store).check("E1").unwrap_err();

        assert!(matches!(err, AuditError::Dump { .. }));
        let results: Vec<_> = fs::read_dir(tmp.path().join("results"))
            .unwrap()
            .collect();
        assert!(results.is_empty());
    }
}
