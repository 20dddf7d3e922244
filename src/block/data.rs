// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `SBlockData`/`SBlockCol` body codec: the actual `DataCols` -> block bytes
//! transform, and its inverse.
//!
//! The key column is always stored first and verbatim (never compressed);
//! every other column in a block shares one [`CompressionAlgorithm`], matching
//! the single `algorithm` tag carried once per [`super::SBlock`] rather than
//! per column. `Delta` is only chosen when every non-key column in the block
//! is [`ColumnType::Int64`]; mixed or float-bearing blocks fall back to `Lz4`
//! (if compiled in) or `None`.

use super::col::SBlockCol;
use super::compression::{self, CompressionAlgorithm};
use crate::coding::{Decode, Encode};
use crate::file::MAGIC_BYTES;
use crate::schema::{ColumnType, TableSchema};
use crate::value::{ColumnValue, Row};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Sentinel marking a NULL `Int64` cell in the encoded column stream.
const NULL_I64: i64 = i64::MIN;

/// A scratch buffer of rows accumulated for the block currently being built.
///
/// Rows accumulate here until the block-fill policy
/// (`max_rows_per_file_block`) decides to spill.
#[derive(Clone, Debug)]
pub struct DataCols {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl DataCols {
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of encoding one block: the `SBlockData` bytes plus everything the
/// caller needs to build the owning [`super::SBlock`] descriptor (offset and
/// `last` are filled in by the write helper, which alone knows the target
/// file and position).
#[derive(Clone, Debug)]
pub struct EncodedBlock {
    pub bytes: Vec<u8>,
    pub algorithm: CompressionAlgorithm,
    pub num_of_rows: u32,
    pub key_first: i64,
    pub key_last: i64,
    pub key_len: u32,
    pub num_of_cols: i16,
}

fn choose_algorithm(schema: &TableSchema) -> CompressionAlgorithm {
    let all_int = schema
        .columns
        .iter()
        .all(|c| c.col_type == ColumnType::Int64);

    if schema.columns.is_empty() || all_int {
        CompressionAlgorithm::Delta
    } else if cfg!(feature = "lz4") {
        CompressionAlgorithm::Lz4
    } else {
        CompressionAlgorithm::None
    }
}

struct ColumnStats {
    sum_bits: i64,
    max_bits: i64,
    min_bits: i64,
    max_index: i16,
    min_index: i16,
    num_of_null: i16,
}

fn compute_stats(col_type: ColumnType, values: &[Option<ColumnValue>]) -> ColumnStats {
    let mut sum = 0f64;
    let mut max: Option<(ColumnValue, usize)> = None;
    let mut min: Option<(ColumnValue, usize)> = None;
    let mut num_of_null = 0i16;

    for (i, value) in values.iter().enumerate() {
        match value {
            None => num_of_null += 1,
            Some(v) => {
                sum += v.as_f64();

                if max.is_none_or(|(cur, _)| v.as_f64() > cur.as_f64()) {
                    max = Some((*v, i));
                }
                if min.is_none_or(|(cur, _)| v.as_f64() < cur.as_f64()) {
                    min = Some((*v, i));
                }
            }
        }
    }

    let sum_bits = match col_type {
        ColumnType::Int64 => sum as i64,
        ColumnType::Double => sum.to_bits() as i64,
    };

    let (max_bits, max_index) = max.map_or((0, -1), |(v, i)| (v.to_stat_bits(), i as i16));
    let (min_bits, min_index) = min.map_or((0, -1), |(v, i)| (v.to_stat_bits(), i as i16));

    ColumnStats {
        sum_bits,
        max_bits,
        min_bits,
        max_index,
        min_index,
        num_of_null,
    }
}

fn encode_column_payload(
    col_type: ColumnType,
    values: &[Option<ColumnValue>],
    algorithm: CompressionAlgorithm,
) -> crate::Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(values.len() * 8);

    match col_type {
        ColumnType::Int64 => {
            let ints: Vec<i64> = values
                .iter()
                .map(|v| match v {
                    Some(ColumnValue::Int64(i)) => *i,
                    Some(ColumnValue::Double(_)) => {
                        unreachable!("column type is Int64, got Double")
                    }
                    None => NULL_I64,
                })
                .collect();

            match algorithm {
                CompressionAlgorithm::Delta => return Ok(compression::encode_delta_i64(&ints)),
                CompressionAlgorithm::None | CompressionAlgorithm::Lz4 => {
                    for v in ints {
                        raw.write_i64::<LittleEndian>(v)?;
                    }
                }
            }
        }
        ColumnType::Double => {
            for v in values {
                let f = match v {
                    Some(ColumnValue::Double(f)) => *f,
                    Some(ColumnValue::Int64(_)) => unreachable!("column type is Double, got Int64"),
                    None => f64::NAN,
                };
                raw.write_f64::<LittleEndian>(f)?;
            }
        }
    }

    compression::compress_bytes(algorithm, &raw)
}

fn decode_column_payload(
    col_type: ColumnType,
    bytes: &[u8],
    num_of_rows: usize,
    algorithm: CompressionAlgorithm,
) -> crate::Result<Vec<Option<ColumnValue>>> {
    match (col_type, algorithm) {
        (ColumnType::Int64, CompressionAlgorithm::Delta) => {
            let ints = compression::decode_delta_i64(bytes, num_of_rows)?;
            Ok(ints
                .into_iter()
                .map(|v| (v != NULL_I64).then_some(ColumnValue::Int64(v)))
                .collect())
        }
        (ColumnType::Int64, algorithm) => {
            let raw = compression::decompress_bytes(algorithm, bytes)?;
            let mut cursor = Cursor::new(raw);
            let mut out = Vec::with_capacity(num_of_rows);
            for _ in 0..num_of_rows {
                let v = cursor.read_i64::<LittleEndian>()?;
                out.push((v != NULL_I64).then_some(ColumnValue::Int64(v)));
            }
            Ok(out)
        }
        (ColumnType::Double, CompressionAlgorithm::Delta) => {
            Err(crate::Error::CorruptBlock("delta algorithm is invalid for Double columns"))
        }
        (ColumnType::Double, algorithm) => {
            let raw = compression::decompress_bytes(algorithm, bytes)?;
            let mut cursor = Cursor::new(raw);
            let mut out = Vec::with_capacity(num_of_rows);
            for _ in 0..num_of_rows {
                let v = cursor.read_f64::<LittleEndian>()?;
                out.push((!v.is_nan()).then_some(ColumnValue::Double(v)));
            }
            Ok(out)
        }
    }
}

/// Encodes `rows` (already sliced to one block's worth) into an `SBlockData`
/// section, computing exact per-column statistics in the same pass.
pub fn encode_block(rows: &[Row], schema: &TableSchema) -> crate::Result<EncodedBlock> {
    assert!(!rows.is_empty(), "encode_block requires at least one row");

    let algorithm = choose_algorithm(schema);
    let num_of_rows = rows.len();

    let mut col_payloads = Vec::with_capacity(schema.columns.len());
    let mut col_entries = Vec::with_capacity(schema.columns.len());

    for (col_idx, col_schema) in schema.columns.iter().enumerate() {
        let values: Vec<Option<ColumnValue>> = rows.iter().map(|r| r.cols[col_idx]).collect();
        let stats = compute_stats(col_schema.col_type, &values);
        let payload = encode_column_payload(col_schema.col_type, &values, algorithm)?;

        col_entries.push(SBlockCol {
            col_id: col_schema.id,
            col_type: col_schema.col_type,
            len: payload.len() as u32,
            offset: 0, // filled in below, once all payload lengths are known
            sum: stats.sum_bits,
            max: stats.max_bits,
            min: stats.min_bits,
            max_index: stats.max_index,
            min_index: stats.min_index,
            num_of_null: stats.num_of_null,
        });
        col_payloads.push(payload);
    }

    let mut running_offset = 0u32;
    for (entry, payload) in col_entries.iter_mut().zip(&col_payloads) {
        entry.offset = running_offset;
        running_offset += payload.len() as u32;
    }

    let mut bytes = Vec::new();
    bytes.write_all(&MAGIC_BYTES)?;
    bytes.write_i16::<LittleEndian>(schema.columns.len() as i16)?;
    bytes.write_u64::<LittleEndian>(schema.uid)?;

    for entry in &col_entries {
        entry.encode_into(&mut bytes)?;
    }

    let key_len_start = bytes.len();
    for row in rows {
        bytes.write_i64::<LittleEndian>(row.ts)?;
    }
    let key_len = (bytes.len() - key_len_start) as u32;

    for payload in &col_payloads {
        bytes.write_all(payload)?;
    }

    Ok(EncodedBlock {
        bytes,
        algorithm,
        num_of_rows: num_of_rows as u32,
        key_first: rows.first().expect("checked non-empty above").ts,
        key_last: rows.last().expect("checked non-empty above").ts,
        key_len,
        num_of_cols: schema.columns.len() as i16,
    })
}

/// Decodes an `SBlockData` section back into rows, validating `delimiter`,
/// `numOfCols`, and `uid` against `schema`.
pub fn decode_block(
    bytes: &[u8],
    schema: &TableSchema,
    algorithm: CompressionAlgorithm,
    num_of_rows: usize,
) -> crate::Result<Vec<Row>> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; MAGIC_BYTES.len()];
    cursor.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(crate::Error::CorruptBlock("SBlockData delimiter mismatch"));
    }

    let num_of_cols = cursor.read_i16::<LittleEndian>()?;
    if num_of_cols as usize != schema.columns.len() {
        return Err(crate::Error::CorruptBlock("SBlockData numOfCols mismatch"));
    }

    let uid = cursor.read_u64::<LittleEndian>()?;
    if uid != schema.uid {
        return Err(crate::Error::CorruptBlock("SBlockData uid mismatch"));
    }

    let mut col_entries = Vec::with_capacity(num_of_cols as usize);
    for _ in 0..num_of_cols {
        col_entries.push(SBlockCol::decode_from(&mut cursor)?);
    }

    let mut timestamps = Vec::with_capacity(num_of_rows);
    for _ in 0..num_of_rows {
        timestamps.push(cursor.read_i64::<LittleEndian>()?);
    }

    let payload_start = cursor.position() as usize;
    let payload = &bytes[payload_start..];

    let mut decoded_cols = Vec::with_capacity(col_entries.len());
    for entry in &col_entries {
        let start = entry.offset as usize;
        let end = start
            .checked_add(entry.len as usize)
            .ok_or(crate::Error::CorruptBlock("column payload overflows block"))?;
        let slice = payload
            .get(start..end)
            .ok_or(crate::Error::CorruptBlock("column payload out of bounds"))?;
        decoded_cols.push(decode_column_payload(entry.col_type, slice, num_of_rows, algorithm)?);
    }

    let mut rows = Vec::with_capacity(num_of_rows);
    for row_idx in 0..num_of_rows {
        let cols = decoded_cols.iter().map(|c| c[row_idx]).collect();
        rows.push(Row::new(timestamps[row_idx], cols));
    }

    Ok(rows)
}
