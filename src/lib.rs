// src/lib.rs

//! Storage consistency auditor.
//!
//! Compares each storage endpoint's site dump against catalog snapshots
//! taken before and after it, quarantines DARK files and keeps the diff as
//! a compressed result file. Endpoints are checked by a pool of worker
//! threads with bounded retries.

pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use daemon::{Auditor, RunSummary};
pub use error::{AuditError, Result};
