// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Retention and tiering: which file-ids are still in the configured window,
//! and which tier (hot/warm/cold) each one currently belongs to.
//!
//! Follows the shape of a FIFO retention policy: compute cutoffs from "now",
//! sweep anything older, generalized here to hot/warm/cold tiers.

use crate::config::{CommitConfig, TierLevel, TIER_COLD, TIER_HOT, TIER_WARM};
use crate::file::{group_file_path, FileKind};
use crate::file_group::FileGroupRegistry;
use crate::fs::FileSystem;
use crate::time::fid_of;

/// The three cutoff file-ids a retention sweep is computed against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FidGroup {
    /// Oldest fid still retained; anything strictly below this is dropped.
    pub min_fid: i64,
    /// Oldest fid still considered hot.
    pub mid_fid: i64,
    /// The fid "now" falls into.
    pub max_fid: i64,
}

/// Computes the retention cutoffs for the current moment, per `config`.
#[must_use]
pub fn plan(config: &CommitConfig, now: i64) -> FidGroup {
    let ticks_per_day = config.precision.ticks_per_day();

    let max_fid = fid_of(now, config.days_per_file, config.precision);
    let min_fid = fid_of(
        now - i64::from(config.keep_days) * ticks_per_day,
        config.days_per_file,
        config.precision,
    );
    let mid_fid = fid_of(
        now - i64::from(config.tier_policy.hot_days) * ticks_per_day,
        config.days_per_file,
        config.precision,
    );

    FidGroup {
        min_fid,
        mid_fid,
        max_fid,
    }
}

/// Classifies `fid` into a tier, given the cutoffs in `group`.
#[must_use]
pub fn fid_level(fid: i64, group: FidGroup) -> TierLevel {
    if fid >= group.mid_fid {
        TIER_HOT
    } else if fid >= group.min_fid {
        TIER_WARM
    } else {
        TIER_COLD
    }
}

/// Deletes every file-group whose fid is older than `group.min_fid`, both
/// from the registry and from disk. Returns the removed fids.
///
/// Run both before a commit starts (so a commit never writes fresh blocks
/// into a file-group that retention is about to delete out from under it)
/// and again after a commit finishes (since the commit may have advanced
/// "now" enough to shift the cutoff).
pub fn sweep<F: FileSystem>(
    registry: &FileGroupRegistry,
    root: &std::path::Path,
    group: FidGroup,
) -> crate::Result<Vec<i64>> {
    let stale: Vec<i64> = registry
        .fids()
        .into_iter()
        .filter(|fid| *fid < group.min_fid)
        .collect();

    for fid in &stale {
        log::debug!("sweeping stale file-group fid={fid} (min_fid={})", group.min_fid);

        for kind in [FileKind::Data, FileKind::Head, FileKind::Last] {
            F::remove_file_if_exists(&group_file_path(root, *fid, kind, false))?;
        }
        registry.remove(*fid);
    }

    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommitConfig, TierPolicy, TIER_HOT};
    use crate::time::TimePrecision;
    use test_log::test;

    fn config() -> CommitConfig {
        CommitConfig::new("/tmp/x")
            .days_per_file(1)
            .precision(TimePrecision::Milliseconds)
            .keep_days(3)
            .tier_policy(TierPolicy { hot_days: 1 })
            .build()
            .unwrap()
    }

    #[test]
    fn plan_orders_cutoffs_descending() {
        let now = 10 * TimePrecision::Milliseconds.ticks_per_day();
        let group = plan(&config(), now);
        assert!(group.min_fid <= group.mid_fid);
        assert!(group.mid_fid <= group.max_fid);
    }

    #[test]
    fn fid_level_classifies_hot_warm_cold() {
        let group = FidGroup {
            min_fid: 5,
            mid_fid: 8,
            max_fid: 10,
        };
        assert_eq!(TIER_HOT, fid_level(9, group));
        assert_eq!(super::TIER_WARM, fid_level(6, group));
        assert_eq!(super::TIER_COLD, fid_level(2, group));
    }

    #[test]
    fn sweep_drops_only_fids_below_min() -> crate::Result<()> {
        use crate::fs::StdFileSystem;
        let dir = tempfile::tempdir()?;

        let registry = FileGroupRegistry::new();
        for fid in [1, 2, 3, 10] {
            registry.get_or_create(fid, TIER_HOT);
        }

        let group = FidGroup {
            min_fid: 5,
            mid_fid: 8,
            max_fid: 10,
        };
        let removed = sweep::<StdFileSystem>(&registry, dir.path(), group)?;

        assert_eq!(vec![1, 2, 3], removed);
        assert_eq!(vec![10], registry.fids());

        Ok(())
    }
}
