// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Top-level commit entrypoint: drains a frozen memtable snapshot into
//! per-file-id write helpers, replays metadata actions, and runs retention,
//! with a retention sweep bracketing the whole sequence.

use super::iter::{create_commit_iters, next_iter_key, seek_commit_iter};
use super::meta::{commit_meta, MetaStore};
use super::write_helper::WriteHelper;
use crate::config::{CommitConfig, TierLevel};
use crate::file_group::{FileGroup, FileGroupRegistry};
use crate::fs::FileSystem;
use crate::memtable::ImmutableMemtable;
use crate::notify::{CommitStatus, NotifyHandler};
use crate::retention::{self, FidGroup};
use crate::time::fid_key_range;
use std::marker::PhantomData;
use std::sync::Mutex;

/// A repository's commit-path dependencies: configuration, the file-group
/// registry readers consult, the metadata store, and the notify hook.
///
/// `commit_lock` enforces the single-commit-thread-per-repo rule: only one
/// [`commit`] call may be in flight at a time.
pub struct Repo<F: FileSystem> {
    pub config: CommitConfig,
    pub registry: FileGroupRegistry,
    pub meta_store: Box<dyn MetaStore>,
    pub notify: Box<dyn NotifyHandler>,
    commit_lock: Mutex<()>,
    _fs: PhantomData<F>,
}

impl<F: FileSystem> Repo<F> {
    #[must_use]
    pub fn new(config: CommitConfig, meta_store: Box<dyn MetaStore>, notify: Box<dyn NotifyHandler>) -> Self {
        Self {
            config,
            registry: FileGroupRegistry::new(),
            meta_store,
            notify,
            commit_lock: Mutex::new(()),
            _fs: PhantomData,
        }
    }
}

/// Runs one commit of `imem` against `repo`:
///
/// 1. Skip entirely if there's nothing to commit.
/// 2. Pre-commit retention sweep.
/// 3. Commit metadata actions.
/// 4. Commit time-series data, one [`WriteHelper`] per touched file-id.
/// 5. Post-commit retention sweep.
/// 6. Notify exactly once.
pub fn commit<F: FileSystem>(repo: &Repo<F>, imem: &ImmutableMemtable) -> crate::Result<()> {
    let _guard = repo.commit_lock.lock().expect("commit lock poisoned");

    F::create_dir_all(&repo.config.root)?;

    if !imem.has_data_to_commit() {
        log::trace!("commit: nothing to commit");
        repo.notify.notify(CommitStatus::NothingToCommit);
        return Ok(());
    }

    let start = std::time::Instant::now();

    let now = repo.config.precision.now();
    let plan = retention::plan(&repo.config, now);

    retention::sweep::<F>(&repo.registry, &repo.config.root, plan)?;

    if let Err(e) = commit_meta(repo.meta_store.as_ref(), &imem.actions) {
        log::warn!("commit: failed committing metadata actions: {e}");
        repo.notify.notify(CommitStatus::Failed(&e));
        return Err(e);
    }

    if let Err(e) = commit_ts_data(repo, imem, plan) {
        log::warn!("commit: failed committing time-series data: {e}");
        repo.notify.notify(CommitStatus::Failed(&e));
        return Err(e);
    }

    retention::sweep::<F>(&repo.registry, &repo.config.root, plan)?;

    log::debug!("commit: finished in {:?}", start.elapsed());
    repo.notify.notify(CommitStatus::Committed);
    Ok(())
}

/// Drains every table's frozen rows into the file-ids they fall into,
/// publishing a [`crate::file_group::FileGroup`] for each one actually
/// touched.
fn commit_ts_data<F: FileSystem>(
    repo: &Repo<F>,
    imem: &ImmutableMemtable,
    plan: FidGroup,
) -> crate::Result<()> {
    let mut iters = create_commit_iters(imem);

    let Some((min_fid, max_fid)) = fid_span(repo, imem) else {
        return Ok(());
    };

    for fid in min_fid..=max_fid {
        if fid < plan.min_fid {
            continue;
        }

        let (fid_min_key, fid_max_key) = fid_key_range(fid, repo.config.days_per_file, repo.config.precision);
        let tier: TierLevel = retention::fid_level(fid, plan);

        let mut helper = WriteHelper::<F>::new(&repo.config.root, fid);
        helper.open()?;

        let mut any_written = false;

        for (tid_idx, slot) in iters.iter_mut().enumerate() {
            let Some(iter) = slot else { continue };
            seek_commit_iter(iter, fid_min_key);
            if !next_iter_key(iter).is_some_and(|k| k <= fid_max_key) {
                continue;
            }

            let schema = imem.tables[tid_idx]
                .as_ref()
                .expect("iterator slot implies a live table")
                .schema
                .clone();

            helper.commit_table(&schema, iter, &repo.config, Some(fid_max_key))?;
            any_written = true;
        }

        let lengths = helper.close(any_written)?;

        if any_written {
            repo.registry.publish(FileGroup { fid, tier, lengths });
        }
    }

    Ok(())
}

/// The inclusive `[min_fid, max_fid]` range any table in `imem` has rows in.
fn fid_span<F: FileSystem>(repo: &Repo<F>, imem: &ImmutableMemtable) -> Option<(i64, i64)> {
    let mut span: Option<(i64, i64)> = None;

    for slot in &imem.tables {
        let Some(table) = slot else { continue };
        let (Some(first), Some(last)) = (table.key_first(), table.key_last()) else {
            continue;
        };

        let f0 = crate::time::fid_of(first, repo.config.days_per_file, repo.config.precision);
        let f1 = crate::time::fid_of(last, repo.config.days_per_file, repo.config.precision);

        span = Some(span.map_or((f0, f1), |(min, max)| (min.min(f0), max.max(f1))));
    }

    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::meta::InMemoryMetaStore;
    use crate::fs::StdFileSystem;
    use crate::memtable::TableMemtable;
    use crate::notify::NoopNotifyHandler;
    use crate::schema::{ColumnSchema, ColumnType, TableSchema};
    use crate::time::TimePrecision;
    use crate::value::{ColumnValue, Row};
    use std::sync::Arc;
    use test_log::test;

    fn schema() -> TableSchema {
        TableSchema::new(1, 7, vec![ColumnSchema::new(1, "v", ColumnType::Int64)])
    }

    fn repo(root: &std::path::Path) -> Repo<StdFileSystem> {
        // Rows in these tests live at fids 0/1, right after the epoch; freeze
        // "now" there too so the default keep_days retention window doesn't
        // treat them as already-expired relative to the real wall clock.
        crate::time::set_now_for_test(Some(0));

        let config = CommitConfig::new(root)
            .days_per_file(1)
            .precision(TimePrecision::Milliseconds)
            .max_rows_per_file_block(1024)
            .min_rows_per_file_block(8)
            .build()
            .unwrap();

        Repo::new(
            config,
            Box::new(InMemoryMetaStore::new()),
            Box::new(NoopNotifyHandler),
        )
    }

    #[test]
    fn commit_with_no_data_notifies_and_does_nothing() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = repo(dir.path());
        let imem = ImmutableMemtable::new(vec![], vec![]);

        commit(&repo, &imem)?;
        assert!(repo.registry.is_empty());

        Ok(())
    }

    #[test]
    fn commit_writes_a_file_group_per_touched_fid() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = repo(dir.path());
        let day = TimePrecision::Milliseconds.ticks_per_day();

        let table = TableMemtable::new(schema());
        table.insert(Row::new(10, vec![Some(ColumnValue::Int64(1))]));
        table.insert(Row::new(day + 10, vec![Some(ColumnValue::Int64(2))]));

        let imem = ImmutableMemtable::new(vec![Some(Arc::new(table))], vec![]);
        commit(&repo, &imem)?;

        assert_eq!(2, repo.registry.len());
        assert_eq!(vec![0, 1], repo.registry.fids());

        Ok(())
    }

    #[test]
    fn second_commit_upserts_into_the_same_fid() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = repo(dir.path());

        let first = TableMemtable::new(schema());
        first.insert(Row::new(1, vec![Some(ColumnValue::Int64(100))]));
        commit(&repo, &ImmutableMemtable::new(vec![Some(Arc::new(first))], vec![]))?;

        let second = TableMemtable::new(schema());
        second.insert(Row::new(1, vec![Some(ColumnValue::Int64(200))]));
        commit(&repo, &ImmutableMemtable::new(vec![Some(Arc::new(second))], vec![]))?;

        assert_eq!(1, repo.registry.len());

        Ok(())
    }

    #[test]
    fn meta_actions_commit_alongside_empty_tables() -> crate::Result<()> {
        use crate::memtable::MetaAction;

        let dir = tempfile::tempdir()?;
        let repo = repo(dir.path());
        let imem = ImmutableMemtable::new(
            vec![],
            vec![MetaAction::UpdateMeta { uid: 1, payload: vec![7] }],
        );

        commit(&repo, &imem)?;

        Ok(())
    }
}
