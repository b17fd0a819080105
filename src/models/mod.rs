// src/models/mod.rs

//! Domain models for the auditor.
//!
//! This module contains all data structures used throughout the daemon,
//! organized by their primary purpose.

mod config;
mod replica;
mod result;
mod task;

// Re-export all public types
pub use config::{
    AuditorConfig, CommonConfig, Config, LocalConfig, LoggingConfig, PathsConfig,
};
pub use replica::{DarkReplica, DiffRecord, Label, RseUsage, guess_replica_info};
pub use result::{COMPRESSED_SUFFIX, ResultFile, compressed_path};
pub use task::{CheckTask, TaskOutcome, TaskReport};
