//! Per-endpoint audit pipeline.
//!
//! - `check`: acquire dumps, diff them and persist the result file
//! - `output`: quarantine DARK files listed in a result file
//! - `sanity`: guard against mass quarantine from a bad dump
//! - `compress`: compress processed result files

pub mod check;
pub mod compress;
pub mod output;
pub mod sanity;

pub use check::{CheckOutcome, CheckSettings, Checker};
pub use compress::compress_file;
pub use output::{OutputOptions, OutputProcessor, OutputSummary};
pub use sanity::{SanityConfig, SanityGuard, SanityVerdict};
