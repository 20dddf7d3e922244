// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Commit-path configuration.
//!
//! A plain struct with a `new`/with-style builder, validated fallibly rather
//! than via panics, since construction is reachable from user input.

use crate::time::TimePrecision;
use std::path::{Path, PathBuf};

/// Number of days between the hot tier and the rest of the window.
///
/// `fid_level` returns tier `0` (hot) for `fid >= mid_fid`, else tier `1`
/// (warm) down to `min_fid`, tiers below that are unreachable (dropped by
/// retention before they could be leveled).
#[derive(Copy, Clone, Debug)]
pub struct TierPolicy {
    /// How many days (at the configured precision) stay in the hot tier.
    pub hot_days: u32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self { hot_days: 1 }
    }
}

/// Tier level a file-group is stored at: `0` hot, `1` warm, `2` cold.
pub type TierLevel = u8;

pub const TIER_HOT: TierLevel = 0;
pub const TIER_WARM: TierLevel = 1;
pub const TIER_COLD: TierLevel = 2;

/// Validated commit-path configuration.
#[derive(Clone, Debug)]
pub struct CommitConfig {
    /// Root directory file groups are stored under.
    pub root: PathBuf,

    /// Number of days of key-space each file-id spans.
    pub days_per_file: u16,

    /// Tick precision of stored timestamps.
    pub precision: TimePrecision,

    /// How many days of file-ids to retain before a group is dropped.
    pub keep_days: u32,

    /// A full block is flushed to `DATA`/`LAST` once it reaches this many rows.
    pub max_rows_per_file_block: u32,

    /// A trailing block below this many rows is kept in `LAST` instead of `DATA`.
    pub min_rows_per_file_block: u32,

    /// Hot/warm/cold tier boundary policy.
    pub tier_policy: TierPolicy,
}

/// Error returned when a [`CommitConfig`] fails validation.
#[derive(Debug)]
pub struct ConfigError(pub &'static str);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid commit config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl CommitConfig {
    /// Starts a config builder rooted at `path` with sane defaults.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
            days_per_file: 10,
            precision: TimePrecision::Milliseconds,
            keep_days: 3650,
            max_rows_per_file_block: 4_096,
            min_rows_per_file_block: 256,
            tier_policy: TierPolicy::default(),
        }
    }

    #[must_use]
    pub fn days_per_file(mut self, value: u16) -> Self {
        self.days_per_file = value;
        self
    }

    #[must_use]
    pub fn precision(mut self, value: TimePrecision) -> Self {
        self.precision = value;
        self
    }

    #[must_use]
    pub fn keep_days(mut self, value: u32) -> Self {
        self.keep_days = value;
        self
    }

    #[must_use]
    pub fn max_rows_per_file_block(mut self, value: u32) -> Self {
        self.max_rows_per_file_block = value;
        self
    }

    #[must_use]
    pub fn min_rows_per_file_block(mut self, value: u32) -> Self {
        self.min_rows_per_file_block = value;
        self
    }

    #[must_use]
    pub fn tier_policy(mut self, value: TierPolicy) -> Self {
        self.tier_policy = value;
        self
    }

    /// Validates the configuration up front, rather than panicking deep
    /// inside the commit path.
    pub fn build(self) -> Result<Self, ConfigError> {
        if self.days_per_file == 0 {
            return Err(ConfigError("days_per_file must be > 0"));
        }
        if self.max_rows_per_file_block == 0 {
            return Err(ConfigError("max_rows_per_file_block must be > 0"));
        }
        if self.min_rows_per_file_block >= self.max_rows_per_file_block {
            return Err(ConfigError(
                "min_rows_per_file_block must be < max_rows_per_file_block",
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn rejects_inverted_block_thresholds() {
        let err = CommitConfig::new("/tmp/x")
            .max_rows_per_file_block(10)
            .min_rows_per_file_block(20)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_zero_days_per_file() {
        let err = CommitConfig::new("/tmp/x").days_per_file(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn accepts_defaults() {
        assert!(CommitConfig::new("/tmp/x").build().is_ok());
    }
}
