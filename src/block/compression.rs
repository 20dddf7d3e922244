// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-column compression algorithms, tagged on [`crate::block::SBlock::algorithm`].
//!
//! The timestamp/key column is always stored verbatim ([`CompressionAlgorithm::None`]);
//! lossy compression of it is forbidden. Non-key integer columns use delta +
//! zig-zag + varint coding, mirroring how time-series columns (often
//! monotonic or slowly varying) compress well without a general-purpose
//! codec. Larger non-key payloads additionally fall back to a generic LZ
//! pass behind the `lz4` feature, backed by the optional `lz4_flex`
//! dependency.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// Compression algorithm tag stored in [`crate::block::SBlock`]'s packed
/// `algorithm:8` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionAlgorithm {
    /// Verbatim copy. Mandatory for the key/timestamp column.
    None,
    /// Zig-zag delta + varint, for integer columns.
    Delta,
    /// Generic LZ compression (only available with the `lz4` feature).
    Lz4,
}

impl CompressionAlgorithm {
    #[must_use]
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Delta => 1,
            Self::Lz4 => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> crate::Result<Self> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Delta),
            2 => Ok(Self::Lz4),
            _ => Err(crate::Error::CorruptBlock("unknown compression tag")),
        }
    }
}

impl Encode for CompressionAlgorithm {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(self.tag())?;
        Ok(())
    }
}

impl Decode for CompressionAlgorithm {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Delta),
            2 => Ok(Self::Lz4),
            tag => Err(DecodeError::InvalidTag(("CompressionAlgorithm", tag))),
        }
    }
}

/// Encodes a run of `i64`s with zig-zag delta + varint coding.
pub(crate) fn encode_delta_i64(values: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    let mut prev = 0i64;

    for &v in values {
        let delta = v.wrapping_sub(prev);
        out.write_i64_varint(delta).expect("writing to a Vec cannot fail");
        prev = v;
    }

    out
}

/// Inverse of [`encode_delta_i64`]. `count` must match the number of values
/// originally encoded.
pub(crate) fn decode_delta_i64(mut bytes: &[u8], count: usize) -> crate::Result<Vec<i64>> {
    let mut out = Vec::with_capacity(count);
    let mut prev = 0i64;

    for _ in 0..count {
        let delta: i64 = bytes
            .read_i64_varint()
            .map_err(|_| crate::Error::CorruptBlock("truncated delta column"))?;
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }

    Ok(out)
}

/// Compresses a raw column byte buffer with the given algorithm.
///
/// Only used for the generic, type-agnostic `Lz4` path; `Delta` is encoded
/// directly from typed values by the caller in `block::data`, since it needs
/// the logical `i64`s rather than their byte representation.
pub(crate) fn compress_bytes(algorithm: CompressionAlgorithm, raw: &[u8]) -> crate::Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None | CompressionAlgorithm::Delta => Ok(raw.to_vec()),

        #[cfg(feature = "lz4")]
        CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(raw)),

        #[cfg(not(feature = "lz4"))]
        CompressionAlgorithm::Lz4 => Err(crate::Error::UnsupportedAlgorithm(algorithm)),
    }
}

/// Inverse of [`compress_bytes`].
pub(crate) fn decompress_bytes(algorithm: CompressionAlgorithm, data: &[u8]) -> crate::Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None | CompressionAlgorithm::Delta => Ok(data.to_vec()),

        #[cfg(feature = "lz4")]
        CompressionAlgorithm::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|_| crate::Error::CorruptBlock("lz4 frame is malformed")),

        #[cfg(not(feature = "lz4"))]
        CompressionAlgorithm::Lz4 => Err(crate::Error::UnsupportedAlgorithm(algorithm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn delta_roundtrip() {
        let values = vec![1000, 1001, 1050, 999, -500, -500, 0];
        let encoded = encode_delta_i64(&values);
        let decoded = decode_delta_i64(&encoded, values.len()).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn delta_roundtrip_empty() {
        let values: Vec<i64> = vec![];
        let encoded = encode_delta_i64(&values);
        let decoded = decode_delta_i64(&encoded, 0).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn algorithm_tag_roundtrip() {
        for algo in [
            CompressionAlgorithm::None,
            CompressionAlgorithm::Delta,
            CompressionAlgorithm::Lz4,
        ] {
            assert_eq!(algo, CompressionAlgorithm::from_tag(algo.tag()).unwrap());
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(CompressionAlgorithm::from_tag(99).is_err());
    }
}
