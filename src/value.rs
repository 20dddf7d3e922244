// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Row model committed through the pipeline: a timestamp key plus a fixed-shape
//! column vector, matching the table's schema at encode time.

/// A time-series key. Keys determine both sort order and file-id placement.
pub type Key = i64;

/// A single scalar cell. `None` represents SQL-style NULL and is excluded
/// from per-column statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnValue {
    Int64(i64),
    Double(f64),
}

impl ColumnValue {
    /// Bit-exact `i64` representation used to store `sum`/`min`/`max` in
    /// [`crate::block::col::SBlockCol`] regardless of the logical column type.
    #[must_use]
    pub(crate) fn to_stat_bits(self) -> i64 {
        match self {
            Self::Int64(v) => v,
            Self::Double(v) => v.to_bits() as i64,
        }
    }

    #[must_use]
    pub(crate) fn from_stat_bits(bits: i64, col_type: crate::schema::ColumnType) -> Self {
        match col_type {
            crate::schema::ColumnType::Int64 => Self::Int64(bits),
            crate::schema::ColumnType::Double => Self::Double(f64::from_bits(bits as u64)),
        }
    }

    #[must_use]
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Self::Int64(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

/// One row: the timestamp key plus one optional cell per non-key column,
/// positioned to match [`crate::schema::TableSchema::columns`].
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub ts: Key,
    pub cols: Vec<Option<ColumnValue>>,
}

impl Row {
    #[must_use]
    pub fn new(ts: Key, cols: Vec<Option<ColumnValue>>) -> Self {
        Self { ts, cols }
    }
}
