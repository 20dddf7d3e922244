// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Registry of per-`fid` file groups (`DATA`/`HEAD`/`LAST` triples) and their
//! current tier placement.
//!
//! A single `RwLock`-guarded directory readers consult to resolve a key to
//! the files that might hold it, swapped atomically whenever a commit
//! finishes.

use crate::config::TierLevel;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Current byte length of each file in a file group, tracked so the write
/// helper knows where to append the next block without re-stat'ing the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileLengths {
    pub data_len: u64,
    pub head_len: u64,
    pub last_len: u64,
}

/// One file-id's worth of on-disk state.
#[derive(Clone, Debug)]
pub struct FileGroup {
    pub fid: i64,
    pub tier: TierLevel,
    pub lengths: FileLengths,
}

impl FileGroup {
    #[must_use]
    pub fn new(fid: i64, tier: TierLevel) -> Self {
        Self {
            fid,
            tier,
            lengths: FileLengths::default(),
        }
    }
}

/// Directory of all live file groups, keyed by `fid`.
///
/// One registry per repository; readers take a shared read lock to resolve
/// which groups might hold a key, the commit thread takes the write lock only
/// for the instant it publishes a finished commit's file-group set.
#[derive(Default)]
pub struct FileGroupRegistry {
    groups: RwLock<BTreeMap<i64, FileGroup>>,
}

impl FileGroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing group for `fid`, or creates one at `tier` if absent.
    pub fn get_or_create(&self, fid: i64, tier: TierLevel) -> FileGroup {
        {
            let groups = self.groups.read().expect("file-group registry poisoned");
            if let Some(group) = groups.get(&fid) {
                return group.clone();
            }
        }

        let mut groups = self.groups.write().expect("file-group registry poisoned");
        groups
            .entry(fid)
            .or_insert_with(|| FileGroup::new(fid, tier))
            .clone()
    }

    /// Publishes `group`, overwriting whatever was previously registered for
    /// its `fid`.
    pub fn publish(&self, group: FileGroup) {
        let mut groups = self.groups.write().expect("file-group registry poisoned");
        groups.insert(group.fid, group);
    }

    /// Removes the group for `fid`, returning it if it existed.
    pub fn remove(&self, fid: i64) -> Option<FileGroup> {
        let mut groups = self.groups.write().expect("file-group registry poisoned");
        groups.remove(&fid)
    }

    /// Returns all registered `fid`s in ascending order.
    #[must_use]
    pub fn fids(&self) -> Vec<i64> {
        let groups = self.groups.read().expect("file-group registry poisoned");
        groups.keys().copied().collect()
    }

    #[must_use]
    pub fn min_fid(&self) -> Option<i64> {
        let groups = self.groups.read().expect("file-group registry poisoned");
        groups.keys().next().copied()
    }

    #[must_use]
    pub fn max_fid(&self) -> Option<i64> {
        let groups = self.groups.read().expect("file-group registry poisoned");
        groups.keys().next_back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let groups = self.groups.read().expect("file-group registry poisoned");
        groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TIER_HOT;
    use test_log::test;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = FileGroupRegistry::new();
        let first = registry.get_or_create(3, TIER_HOT);
        let second = registry.get_or_create(3, TIER_HOT);
        assert_eq!(first.fid, second.fid);
        assert_eq!(1, registry.len());
    }

    #[test]
    fn min_max_fid_track_registered_groups() {
        let registry = FileGroupRegistry::new();
        registry.get_or_create(5, TIER_HOT);
        registry.get_or_create(1, TIER_HOT);
        registry.get_or_create(9, TIER_HOT);

        assert_eq!(Some(1), registry.min_fid());
        assert_eq!(Some(9), registry.max_fid());
    }

    #[test]
    fn remove_drops_the_group() {
        let registry = FileGroupRegistry::new();
        registry.get_or_create(1, TIER_HOT);
        assert!(registry.remove(1).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn publish_overwrites_lengths() {
        let registry = FileGroupRegistry::new();
        registry.get_or_create(1, TIER_HOT);

        let mut updated = FileGroup::new(1, TIER_HOT);
        updated.lengths.data_len = 4096;
        registry.publish(updated);

        let group = registry.get_or_create(1, TIER_HOT);
        assert_eq!(4096, group.lengths.data_len);
    }
}
