// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The columnar block format: `SBlock` descriptors, `SBlockIdx`/`SBlockInfo`
//! directory sections, and the `SBlockData`/`SBlockCol` block body codec.

pub mod col;
pub mod compression;
pub mod data;
pub mod idx;
pub mod info;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Packs `last:1|offset:63` into a little-endian `u64`.
fn pack_last_offset(last: bool, offset: u64) -> u64 {
    debug_assert!(offset <= (u64::MAX >> 1), "block offset must fit in 63 bits");
    (offset << 1) | u64::from(last)
}

fn unpack_last_offset(packed: u64) -> (bool, u64) {
    (packed & 1 == 1, packed >> 1)
}

/// Packs `algorithm:8|numOfRows:24` into a little-endian `u32`.
fn pack_algorithm_rows(algorithm: u8, num_of_rows: u32) -> u32 {
    debug_assert!(num_of_rows <= 0x00FF_FFFF, "numOfRows must fit in 24 bits");
    (num_of_rows << 8) | u32::from(algorithm)
}

fn unpack_algorithm_rows(packed: u32) -> (u8, u32) {
    ((packed & 0xFF) as u8, packed >> 8)
}

/// Descriptor of one row block, either inside `DATA` or `LAST`.
///
/// Blocks within a table are ordered by `key_first` ascending and must not
/// overlap; at most the final block of a table may have `last = true`.
#[derive(Clone, Debug, PartialEq)]
pub struct SBlock {
    /// Whether this block's bytes live in the `LAST` file rather than `DATA`.
    pub last: bool,
    /// Byte offset into the owning file (`DATA` or `LAST`).
    pub offset: u64,
    pub algorithm: compression::CompressionAlgorithm,
    pub num_of_rows: u32,
    /// Total encoded length of the `SBlockData` payload.
    pub len: u32,
    /// Length in bytes of the key column section.
    pub key_len: u32,
    /// Number of contiguous sub-blocks this super-block represents (>= 1).
    pub num_of_sub_blocks: i16,
    /// Number of non-key columns.
    pub num_of_cols: i16,
    pub key_first: i64,
    pub key_last: i64,
}

impl SBlock {
    #[must_use]
    pub const fn serialized_len() -> usize {
        8 // last:offset
            + 4 // algorithm:numOfRows
            + 4 // len
            + 4 // keyLen
            + 2 // numOfSubBlocks
            + 2 // numOfCols
            + 8 // keyFirst
            + 8 // keyLast
    }
}

impl Encode for SBlock {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<LittleEndian>(pack_last_offset(self.last, self.offset))?;
        writer.write_u32::<LittleEndian>(pack_algorithm_rows(
            self.algorithm.tag(),
            self.num_of_rows,
        ))?;
        writer.write_u32::<LittleEndian>(self.len)?;
        writer.write_u32::<LittleEndian>(self.key_len)?;
        writer.write_i16::<LittleEndian>(self.num_of_sub_blocks)?;
        writer.write_i16::<LittleEndian>(self.num_of_cols)?;
        writer.write_i64::<LittleEndian>(self.key_first)?;
        writer.write_i64::<LittleEndian>(self.key_last)?;
        Ok(())
    }
}

impl Decode for SBlock {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let (last, offset) = unpack_last_offset(reader.read_u64::<LittleEndian>()?);
        let (algorithm_tag, num_of_rows) = unpack_algorithm_rows(reader.read_u32::<LittleEndian>()?);
        let algorithm = compression::CompressionAlgorithm::from_tag(algorithm_tag)
            .map_err(|_| DecodeError::InvalidTag(("CompressionAlgorithm", algorithm_tag)))?;
        let len = reader.read_u32::<LittleEndian>()?;
        let key_len = reader.read_u32::<LittleEndian>()?;
        let num_of_sub_blocks = reader.read_i16::<LittleEndian>()?;
        let num_of_cols = reader.read_i16::<LittleEndian>()?;
        let key_first = reader.read_i64::<LittleEndian>()?;
        let key_last = reader.read_i64::<LittleEndian>()?;

        Ok(Self {
            last,
            offset,
            algorithm,
            num_of_rows,
            len,
            key_len,
            num_of_sub_blocks,
            num_of_cols,
            key_first,
            key_last,
        })
    }
}

/// Item size trait, for scratch buffer accounting used in block-fill
/// decisions.
pub trait ItemSize {
    fn size(&self) -> usize;
}
