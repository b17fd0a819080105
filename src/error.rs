// src/error.rs

//! Unified error handling for the auditor.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for auditor operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Unified auditor error type.
#[derive(Error, Debug)]
pub enum AuditError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Site dump or catalog snapshot could not be acquired or diffed
    #[error("Dump error for {rse}: {message}")]
    Dump { rse: String, message: String },

    /// Quarantine store or usage lookup failed
    #[error("Quarantine error for {rse}: {message}")]
    Quarantine { rse: String, message: String },

    /// A path does not follow the `<rse>_<YYYYMMDD>` result naming
    #[error("Invalid result file name: {}", .0.display())]
    InvalidResultName(PathBuf),

    /// A result file produced by this process could not be parsed
    #[error("Malformed result file {} at line {line}: {reason}", path.display())]
    MalformedResult {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A check panicked instead of returning an error
    #[error("Unhandled fault: {0}")]
    Fault(String),

    /// Too many DARK files compared to the endpoint's known file count
    #[error(
        "Number of DARK files for {rse} is exceeding threshold: {dark} > {threshold} * {files}"
    )]
    SanityCheck {
        rse: String,
        dark: usize,
        files: u64,
        threshold: f64,
    },
}

impl AuditError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a dump acquisition error with context.
    pub fn dump(rse: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Dump {
            rse: rse.into(),
            message: message.to_string(),
        }
    }

    /// Create a quarantine store error with context.
    pub fn quarantine(rse: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Quarantine {
            rse: rse.into(),
            message: message.to_string(),
        }
    }

    /// Short class name used in failure log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Toml(_) => "TomlError",
            Self::Config(_) => "ConfigError",
            Self::Validation(_) => "ValidationError",
            Self::Dump { .. } => "DumpError",
            Self::Quarantine { .. } => "QuarantineError",
            Self::InvalidResultName(_) => "InvalidResultName",
            Self::MalformedResult { .. } => "MalformedResult",
            Self::Fault(_) => "Fault",
            Self::SanityCheck { .. } => "SanityCheckError",
        }
    }

    /// Whether the error means the audit itself cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedResult { .. } | Self::SanityCheck { .. })
    }
}
