// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `SBlockIdx`: the per-table directory entry appended to `HEAD`.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Whether a table's trailing block in [`SBlockIdx`] lives in `LAST`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HasLast {
    /// No blocks, or the last block lives in `DATA`.
    No,
    /// The last entry in `blocks[]` is stored in the `LAST` file.
    Yes,
}

fn pack_has_last_num_blocks(has_last: HasLast, num_of_blocks: u32) -> u32 {
    debug_assert!(num_of_blocks <= 0x3FFF_FFFF, "numOfBlocks must fit in 30 bits");
    let tag: u32 = match has_last {
        HasLast::No => 0,
        HasLast::Yes => 1,
    };
    (num_of_blocks << 2) | tag
}

fn unpack_has_last_num_blocks(packed: u32) -> (HasLast, u32) {
    let tag = packed & 0b11;
    let has_last = if tag == 0 { HasLast::No } else { HasLast::Yes };
    (has_last, packed >> 2)
}

/// Per-table directory entry in `HEAD`, pointing at that table's
/// [`crate::block::info::SBlockInfo`] section.
#[derive(Clone, Debug, PartialEq)]
pub struct SBlockIdx {
    pub tid: u32,
    pub uid: u64,
    /// Byte offset of the table's `SBlockInfo` section within `HEAD`.
    pub offset: u64,
    /// Byte length of the table's `SBlockInfo` section.
    pub len: u32,
    pub num_of_blocks: u32,
    pub has_last: HasLast,
    pub max_key: i64,
}

impl SBlockIdx {
    #[must_use]
    pub const fn serialized_len() -> usize {
        4 // tid
            + 8 // uid
            + 8 // offset
            + 4 // len
            + 4 // hasLast:numOfBlocks
            + 8 // maxKey
    }
}

impl Encode for SBlockIdx {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.tid)?;
        writer.write_u64::<LittleEndian>(self.uid)?;
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.len)?;
        writer.write_u32::<LittleEndian>(pack_has_last_num_blocks(self.has_last, self.num_of_blocks))?;
        writer.write_i64::<LittleEndian>(self.max_key)?;
        Ok(())
    }
}

impl Decode for SBlockIdx {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tid = reader.read_u32::<LittleEndian>()?;
        let uid = reader.read_u64::<LittleEndian>()?;
        let offset = reader.read_u64::<LittleEndian>()?;
        let len = reader.read_u32::<LittleEndian>()?;
        let (has_last, num_of_blocks) = unpack_has_last_num_blocks(reader.read_u32::<LittleEndian>()?);
        let max_key = reader.read_i64::<LittleEndian>()?;

        Ok(Self {
            tid,
            uid,
            offset,
            len,
            num_of_blocks,
            has_last,
            max_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn sblock_idx_roundtrip() -> crate::Result<()> {
        let idx = SBlockIdx {
            tid: 7,
            uid: 1234,
            offset: 4096,
            len: 512,
            num_of_blocks: 3,
            has_last: HasLast::Yes,
            max_key: 99_999,
        };

        let bytes = idx.encode_into_vec();
        assert_eq!(SBlockIdx::serialized_len(), bytes.len());
        let decoded = SBlockIdx::decode_from(&mut Cursor::new(bytes))?;
        assert_eq!(idx, decoded);

        Ok(())
    }

    #[test]
    fn has_last_and_num_blocks_pack_independently() {
        for has_last in [HasLast::No, HasLast::Yes] {
            for n in [0u32, 1, 1_000, 0x3FFF_FFFF] {
                let packed = pack_has_last_num_blocks(has_last, n);
                assert_eq!((has_last, n), unpack_has_last_num_blocks(packed));
            }
        }
    }
}
