// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `SBlockCol`: the per-column directory entry inside an `SBlockData` section.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::schema::ColumnType;
use crate::value::ColumnValue;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Packs `type:8|offset:24` into a single little-endian `u32`, preserving an
/// exact wire bit assignment without relying on native bitfield layout
/// (Rust has none).
fn pack_type_offset(col_type: u8, offset: u32) -> u32 {
    debug_assert!(offset <= 0x00FF_FFFF, "column offset must fit in 24 bits");
    (offset << 8) | u32::from(col_type)
}

fn unpack_type_offset(packed: u32) -> (u8, u32) {
    let col_type = (packed & 0xFF) as u8;
    let offset = packed >> 8;
    (col_type, offset)
}

fn column_type_tag(t: ColumnType) -> u8 {
    match t {
        ColumnType::Int64 => 0,
        ColumnType::Double => 1,
    }
}

fn column_type_from_tag(tag: u8) -> crate::Result<ColumnType> {
    match tag {
        0 => Ok(ColumnType::Int64),
        1 => Ok(ColumnType::Double),
        _ => Err(crate::Error::CorruptBlock("unknown column type tag")),
    }
}

/// Per-column header and exact statistics, one per non-key column in a block.
///
/// `sum`/`max`/`min` are stored as bit-exact `i64` regardless of the logical
/// column type (an `f64` stores `to_bits()`), matching the struct-of-raw-
/// integers layout of the on-disk format this is grounded on.
#[derive(Clone, Debug, PartialEq)]
pub struct SBlockCol {
    pub col_id: u16,
    pub col_type: ColumnType,
    /// Compressed byte length of this column's payload.
    pub len: u32,
    /// Byte offset of this column's payload, relative to the end of the
    /// `SBlockData` header + column directory.
    pub offset: u32,
    pub sum: i64,
    pub max: i64,
    pub min: i64,
    pub max_index: i16,
    pub min_index: i16,
    pub num_of_null: i16,
}

impl SBlockCol {
    #[must_use]
    pub fn max_value(&self) -> ColumnValue {
        ColumnValue::from_stat_bits(self.max, self.col_type)
    }

    #[must_use]
    pub fn min_value(&self) -> ColumnValue {
        ColumnValue::from_stat_bits(self.min, self.col_type)
    }

    #[must_use]
    pub const fn serialized_len() -> usize {
        2 // col_id
            + 4 // type:offset
            + 4 // len
            + 8 // sum
            + 8 // max
            + 8 // min
            + 2 // max_index
            + 2 // min_index
            + 2 // num_of_null
    }
}

impl Encode for SBlockCol {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u16::<LittleEndian>(self.col_id)?;
        writer.write_u32::<LittleEndian>(pack_type_offset(column_type_tag(self.col_type), self.offset))?;
        writer.write_u32::<LittleEndian>(self.len)?;
        writer.write_i64::<LittleEndian>(self.sum)?;
        writer.write_i64::<LittleEndian>(self.max)?;
        writer.write_i64::<LittleEndian>(self.min)?;
        writer.write_i16::<LittleEndian>(self.max_index)?;
        writer.write_i16::<LittleEndian>(self.min_index)?;
        writer.write_i16::<LittleEndian>(self.num_of_null)?;
        Ok(())
    }
}

impl Decode for SBlockCol {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let col_id = reader.read_u16::<LittleEndian>()?;
        let packed = reader.read_u32::<LittleEndian>()?;
        let (type_tag, offset) = unpack_type_offset(packed);
        let col_type = column_type_from_tag(type_tag)
            .map_err(|_| DecodeError::InvalidTag(("ColumnType", type_tag)))?;
        let len = reader.read_u32::<LittleEndian>()?;
        let sum = reader.read_i64::<LittleEndian>()?;
        let max = reader.read_i64::<LittleEndian>()?;
        let min = reader.read_i64::<LittleEndian>()?;
        let max_index = reader.read_i16::<LittleEndian>()?;
        let min_index = reader.read_i16::<LittleEndian>()?;
        let num_of_null = reader.read_i16::<LittleEndian>()?;

        Ok(Self {
            col_id,
            col_type,
            len,
            offset,
            sum,
            max,
            min,
            max_index,
            min_index,
            num_of_null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn block_col_raw_roundtrip() -> crate::Result<()> {
        let col = SBlockCol {
            col_id: 2,
            col_type: ColumnType::Double,
            len: 128,
            offset: 64,
            sum: 42i64.to_le(),
            max: 10,
            min: -10,
            max_index: 3,
            min_index: 7,
            num_of_null: 1,
        };

        let bytes = col.encode_into_vec();
        assert_eq!(SBlockCol::serialized_len(), bytes.len());

        let decoded = SBlockCol::decode_from(&mut Cursor::new(bytes))?;
        assert_eq!(col, decoded);

        Ok(())
    }

    #[test]
    fn offset_pack_unpack_is_lossless() {
        let packed = pack_type_offset(1, 0x00AB_CDEF);
        let (t, off) = unpack_type_offset(packed);
        assert_eq!(1, t);
        assert_eq!(0x00AB_CDEF, off);
    }
}
