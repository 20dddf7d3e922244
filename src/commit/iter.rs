// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-table merge-scan cursors over a frozen memtable snapshot: one
//! forward-only cursor per table slot, peekable without consuming, seekable
//! to skip past rows a caller has already merged.

use crate::memtable::{ImmutableMemtable, TableMemtable};
use crate::value::{Key, Row};

/// A forward-only cursor over one table's frozen rows.
pub struct CommitIter<'a> {
    table: &'a TableMemtable,
    /// The key the next `take()` should start scanning from.
    cursor: Option<Key>,
}

impl<'a> CommitIter<'a> {
    #[must_use]
    pub fn new(table: &'a TableMemtable, from: Option<Key>) -> Self {
        Self { table, cursor: from }
    }

    /// Returns the key of the next row without consuming it.
    #[must_use]
    pub fn peek_key(&self) -> Option<Key> {
        self.table.range_from(self.cursor).next().map(|r| r.ts)
    }

    /// Moves the cursor forward to `key`, without affecting rows already
    /// consumed by `take()`. Seeking backward is a no-op: the cursor never
    /// revisits a key it has passed.
    pub fn seek(&mut self, key: Key) {
        if self.cursor.is_none_or(|c| key > c) {
            self.cursor = Some(key);
        }
    }

    /// Consumes and returns the next row, advancing the cursor past it.
    pub fn take(&mut self) -> Option<Row> {
        let row = self.table.range_from(self.cursor).next()?;
        self.cursor = Some(row.ts + 1);
        Some(row)
    }
}

/// Builds one cursor per populated table slot in `imem`.
#[must_use]
pub fn create_commit_iters(imem: &ImmutableMemtable) -> Vec<Option<CommitIter<'_>>> {
    imem.tables
        .iter()
        .map(|slot| slot.as_ref().map(|table| CommitIter::new(table, None)))
        .collect()
}

/// Advances `iter`'s cursor to `key`, if it exists.
pub fn seek_commit_iter(iter: &mut CommitIter<'_>, key: Key) {
    iter.seek(key);
}

/// Peeks the next key `iter` would yield, or `None` if it's exhausted.
#[must_use]
pub fn next_iter_key(iter: &CommitIter<'_>) -> Option<Key> {
    iter.peek_key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, ColumnType, TableSchema};
    use crate::value::ColumnValue;
    use std::sync::Arc;
    use test_log::test;

    fn schema() -> TableSchema {
        TableSchema::new(1, 7, vec![ColumnSchema::new(1, "v", ColumnType::Int64)])
    }

    #[test]
    fn take_advances_and_exhausts() {
        let table = TableMemtable::new(schema());
        for ts in [10, 20, 30] {
            table.insert(Row::new(ts, vec![None]));
        }

        let mut iter = CommitIter::new(&table, None);
        assert_eq!(Some(10), iter.peek_key());
        assert_eq!(10, iter.take().unwrap().ts);
        assert_eq!(20, iter.take().unwrap().ts);
        assert_eq!(30, iter.take().unwrap().ts);
        assert!(iter.take().is_none());
    }

    #[test]
    fn seek_skips_forward_only() {
        let table = TableMemtable::new(schema());
        for ts in [10, 20, 30, 40] {
            table.insert(Row::new(ts, vec![None]));
        }

        let mut iter = CommitIter::new(&table, None);
        iter.seek(25);
        assert_eq!(Some(30), iter.peek_key());

        iter.seek(15); // backward seek is a no-op
        assert_eq!(Some(30), iter.peek_key());
    }

    #[test]
    fn create_commit_iters_skips_empty_slots() {
        let table = TableMemtable::new(schema());
        table.insert(Row::new(1, vec![Some(ColumnValue::Int64(1))]));

        let imem = ImmutableMemtable::new(vec![Some(Arc::new(table)), None], vec![]);
        let iters = create_commit_iters(&imem);

        assert!(iters[0].is_some());
        assert!(iters[1].is_none());
    }
}
