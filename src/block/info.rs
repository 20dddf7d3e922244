// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `SBlockInfo`: a table's block list, as appended to `HEAD` during a commit.

use super::SBlock;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::file::MAGIC_BYTES;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Per-table header plus its full block list, written once per table per
/// commit. `delimiter` exists purely for offline recovery scans and is never
/// consulted by the normal read path.
#[derive(Clone, Debug, PartialEq)]
pub struct SBlockInfo {
    pub tid: u32,
    pub uid: u64,
    pub blocks: Vec<SBlock>,
}

impl SBlockInfo {
    #[must_use]
    pub fn new(tid: u32, uid: u64, blocks: Vec<SBlock>) -> Self {
        Self { tid, uid, blocks }
    }

    /// Validates that `blocks` is strictly ordered and non-overlapping by
    /// `key_first`, with `last` set on at most the final block.
    pub fn validate(&self) -> crate::Result<()> {
        for window in self.blocks.windows(2) {
            let [a, b] = window else { unreachable!() };
            if a.key_last >= b.key_first {
                return Err(crate::Error::InvariantViolation(
                    "blocks must be strictly increasing and non-overlapping by key_first",
                ));
            }
        }

        for block in self.blocks.iter().rev().skip(1) {
            if block.last {
                return Err(crate::Error::InvariantViolation(
                    "only the final block of a table may be stored in LAST",
                ));
            }
        }

        Ok(())
    }
}

impl Encode for SBlockInfo {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u32::<LittleEndian>(self.tid)?;
        writer.write_u64::<LittleEndian>(self.uid)?;
        writer.write_u32::<LittleEndian>(self.blocks.len() as u32)?;

        for block in &self.blocks {
            block.encode_into(writer)?;
        }

        Ok(())
    }
}

impl Decode for SBlockInfo {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; MAGIC_BYTES.len()];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidHeader("SBlockInfo"));
        }

        let tid = reader.read_u32::<LittleEndian>()?;
        let uid = reader.read_u64::<LittleEndian>()?;
        let num_of_blocks = reader.read_u32::<LittleEndian>()?;

        let mut blocks = Vec::with_capacity(num_of_blocks as usize);
        for _ in 0..num_of_blocks {
            blocks.push(SBlock::decode_from(reader)?);
        }

        Ok(Self { tid, uid, blocks })
    }
}
