// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-memory write buffer: one skiplist per table, plus the pending metadata
//! actions queued alongside it. A commit always operates on a frozen,
//! immutable snapshot of this structure, never the live buffer.

use crate::schema::TableSchema;
use crate::value::{Key, Row};
use crossbeam_skiplist::SkipMap;
use std::sync::Arc;

/// A queued metadata mutation, recorded alongside data writes so it can be
/// replayed against the meta store inside the same commit.
#[derive(Clone, Debug)]
pub enum MetaAction {
    UpdateMeta { uid: u64, payload: Vec<u8> },
    DropMeta { uid: u64 },
}

/// One table's write buffer: a key-ordered skiplist of rows plus the schema
/// it was written against.
///
/// Backed by a lock-free skiplist so concurrent single-writer inserts can
/// proceed alongside concurrent range reads.
pub struct TableMemtable {
    pub schema: TableSchema,
    rows: SkipMap<Key, Row>,
}

impl TableMemtable {
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: SkipMap::new(),
        }
    }

    /// Inserts or overwrites the row at `row.ts`: the last write for a given
    /// key wins within a memtable generation.
    pub fn insert(&self, row: Row) {
        self.rows.insert(row.ts, row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn key_first(&self) -> Option<Key> {
        self.rows.front().map(|e| *e.key())
    }

    #[must_use]
    pub fn key_last(&self) -> Option<Key> {
        self.rows.back().map(|e| *e.key())
    }

    /// Iterates rows in key order, starting at or after `from` if given.
    pub fn range_from(&self, from: Option<Key>) -> impl Iterator<Item = Row> + '_ {
        let lower = from.unwrap_or(Key::MIN);
        self.rows.range(lower..).map(|e| e.value().clone())
    }
}

/// A frozen (read-only) snapshot of the write buffer, handed to the commit
/// pipeline. One slot per table index (a `tid`-indexed iterator array), plus
/// the metadata actions accumulated since the previous commit.
///
/// Holding this behind an `Arc` (rather than cloning the skiplists) lets the
/// live memtable swap to a fresh generation the instant this snapshot is
/// taken, a copy-on-write sealed-segment handoff.
pub struct ImmutableMemtable {
    pub tables: Vec<Option<Arc<TableMemtable>>>,
    pub actions: Vec<MetaAction>,
}

impl ImmutableMemtable {
    #[must_use]
    pub fn new(tables: Vec<Option<Arc<TableMemtable>>>, actions: Vec<MetaAction>) -> Self {
        Self { tables, actions }
    }

    /// Whether any table holds at least one row, or any metadata action is
    /// pending — i.e. whether this snapshot has anything to commit at all.
    #[must_use]
    pub fn has_data_to_commit(&self) -> bool {
        !self.actions.is_empty()
            || self
                .tables
                .iter()
                .flatten()
                .any(|t| !t.is_empty())
    }
}
