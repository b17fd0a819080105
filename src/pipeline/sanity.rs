//! Sanity guard against catastrophic false positives.
//!
//! Prevents a corrupted or mis-dated site dump from quarantining an
//! endpoint's legitimate files by aborting before anything is submitted
//! when the DARK count is a significant share of the endpoint.
//!
//! > If the number of DARK files exceeds **20%** of the files known on
//! > the endpoint, quarantine is aborted.

use crate::error::{AuditError, Result};
use crate::models::RseUsage;

/// Sanity guard configuration.
#[derive(Debug, Clone)]
pub struct SanityConfig {
    /// Maximum DARK / known-files ratio. Default: 0.2
    pub threshold: f64,
    /// Skip the check entirely
    pub enabled: bool,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            enabled: true,
        }
    }
}

/// Guard comparing DARK counts against endpoint usage.
#[derive(Debug, Clone, Default)]
pub struct SanityGuard {
    config: SanityConfig,
}

/// Result of a sanity check.
#[derive(Debug, Clone, PartialEq)]
pub enum SanityVerdict {
    /// Safe to quarantine
    Passed { dark: usize, limit: f64 },
    /// Checking is turned off
    Disabled { dark: usize },
    /// Too many DARK files - abort
    Exceeded { dark: usize, files: u64, limit: f64 },
}

impl SanityGuard {
    pub fn new(threshold: f64, enabled: bool) -> Self {
        Self::with_config(SanityConfig { threshold, enabled })
    }

    pub fn with_config(config: SanityConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, dark: usize, usage: &RseUsage) -> SanityVerdict {
        if !self.config.enabled {
            return SanityVerdict::Disabled { dark };
        }

        let limit = self.config.threshold * usage.files as f64;
        if dark as f64 > limit {
            SanityVerdict::Exceeded {
                dark,
                files: usage.files,
                limit,
            }
        } else {
            SanityVerdict::Passed { dark, limit }
        }
    }

    /// Validate and return Ok if safe, Err if the guard rejects the result.
    pub fn validate(&self, rse: &str, dark: usize, usage: &RseUsage) -> Result<()> {
        match self.check(dark, usage) {
            SanityVerdict::Passed { dark, limit } => {
                log::debug!("Sanity check for {}: PASSED ({} DARK <= {:.1})", rse, dark, limit);
                Ok(())
            }
            SanityVerdict::Disabled { dark } => {
                log::debug!("Sanity check for {}: DISABLED ({} DARK)", rse, dark);
                Ok(())
            }
            SanityVerdict::Exceeded { dark, files, limit } => {
                log::error!(
                    "Sanity check for {}: TRIGGERED! {} DARK files > {:.1} ({} x {} files)",
                    rse,
                    dark,
                    limit,
                    self.config.threshold,
                    files
                );
                Err(AuditError::SanityCheck {
                    rse: rse.to_string(),
                    dark,
                    files,
                    threshold: self.config.threshold,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USAGE: RseUsage = RseUsage { files: 1000 };

    #[test]
    fn test_at_threshold_passes() {
        let guard = SanityGuard::default();
        assert!(matches!(
            guard.check(200, &USAGE),
            SanityVerdict::Passed { dark: 200, .. }
        ));
    }

    #[test]
    fn test_above_threshold_triggers() {
        let guard = SanityGuard::default();
        assert!(matches!(
            guard.check(201, &USAGE),
            SanityVerdict::Exceeded { dark: 201, files: 1000, .. }
        ));
    }

    #[test]
    fn test_disabled_never_triggers() {
        let guard = SanityGuard::new(0.2, false);
        assert!(matches!(
            guard.check(5000, &USAGE),
            SanityVerdict::Disabled { .. }
        ));
    }

    #[test]
    fn test_empty_endpoint_rejects_any_dark() {
        let guard = SanityGuard::default();
        let empty = RseUsage { files: 0 };
        assert!(matches!(guard.check(0, &empty), SanityVerdict::Passed { .. }));
        assert!(matches!(guard.check(1, &empty), SanityVerdict::Exceeded { .. }));
    }

    #[test]
    fn test_validate_returns_error() {
        let guard = SanityGuard::new(0.1, true);
        let result = guard.validate("E1", 101, &USAGE);
        assert!(matches!(
            result.unwrap_err(),
            AuditError::SanityCheck { dark: 101, files: 1000, .. }
        ));
        assert!(guard.validate("E1", 100, &USAGE).is_ok());
    }
}
