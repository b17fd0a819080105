// src/models/replica.rs

//! Diff records and the replica descriptors derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of a mismatch between site dump and catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    /// On storage, unknown to the catalog
    Dark,
    /// In the catalog, missing from storage
    Lost,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dark => "DARK",
            Label::Lost => "LOST",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DARK" => Ok(Label::Dark),
            "LOST" => Ok(Label::Lost),
            other => Err(format!("unexpected label '{other}'")),
        }
    }
}

/// One labeled line of a result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    pub label: Label,
    pub path: String,
}

impl DiffRecord {
    pub fn new(label: Label, path: impl Into<String>) -> Self {
        Self {
            label,
            path: path.into(),
        }
    }

    /// Render as `LABEL,path`.
    pub fn csv(&self) -> String {
        format!("{},{}", self.label, self.path)
    }

    /// Parse a `LABEL,path` line, splitting on the first comma only.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let line = line.trim_end();
        let (label, path) = line
            .split_once(',')
            .ok_or_else(|| format!("missing ',' separator in '{line}'"))?;
        Ok(Self {
            label: label.parse()?,
            path: path.to_string(),
        })
    }
}

/// Replica descriptor submitted to the quarantine store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarkReplica {
    pub path: String,
    pub scope: Option<String>,
    pub name: String,
}

impl DarkReplica {
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let (scope, name) = guess_replica_info(&path);
        Self { path, scope, name }
    }
}

/// Guess the scope and name of a replica from its path on the endpoint.
///
/// `group/<x>/...` and `user/<x>/...` paths carry a two-part scope
/// (`group.<x>`); any other multi-segment path uses its first segment.
/// The name is always the last segment, and a single-segment path has
/// no scope. Leading slashes are ignored when splitting.
pub fn guess_replica_info(path: &str) -> (Option<String>, String) {
    let items: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match items.as_slice() {
        [""] => (None, path.to_string()),
        [single] => (None, (*single).to_string()),
        [first, second, .., last] if matches!(*first, "group" | "user") => {
            (Some(format!("{first}.{second}")), (*last).to_string())
        }
        [first, .., last] => (Some((*first).to_string()), (*last).to_string()),
        [] => (None, path.to_string()),
    }
}

/// Endpoint usage statistics consulted by the sanity guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RseUsage {
    /// Total number of files the catalog knows on the endpoint
    pub files: u64,
}
