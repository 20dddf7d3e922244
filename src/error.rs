// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    block::compression::CompressionAlgorithm,
    coding::{DecodeError, EncodeError},
};

/// Kinds of errors the commit pipeline can produce.
///
/// This mirrors the error taxonomy of the system this crate's design is
/// grounded on: `OOM`, `IO`, `CORRUPT_ON_DISK`, `SCHEMA_MISMATCH`,
/// `UNSUPPORTED_ALGORITHM`, `META_STORE_ERROR`, `INVARIANT_VIOLATION`.
#[derive(Debug)]
pub enum Error {
    /// I/O error (open, pwrite, fsync, rename, ...)
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// A block's `delimiter`, length, or column directory did not check out.
    CorruptBlock(&'static str),

    /// Invalid checksum value (got, expected)
    InvalidChecksum { got: u128, expected: u128 },

    /// A block referenced a compression tag the codec does not know.
    UnsupportedAlgorithm(CompressionAlgorithm),

    /// The iterator's row shape didn't match the table's current schema.
    SchemaMismatch { table: u32, reason: &'static str },

    /// The meta key-value store rejected a put/delete inside the commit envelope.
    MetaStore(String),

    /// A structural invariant of the file format was violated.
    ///
    /// This is fatal: the crate never panics on it directly, but callers
    /// should treat it as unrecoverable (assert in debug, abort in release)
    /// rather than retry.
    InvariantViolation(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::CorruptBlock(reason) => write!(f, "corrupt block: {reason}"),
            Self::InvalidChecksum { got, expected } => {
                write!(f, "checksum mismatch: got {got}, expected {expected}")
            }
            Self::UnsupportedAlgorithm(tag) => write!(f, "unsupported compression algorithm: {tag:?}"),
            Self::SchemaMismatch { table, reason } => {
                write!(f, "schema mismatch on table {table}: {reason}")
            }
            Self::MetaStore(msg) => write!(f, "meta store error: {msg}"),
            Self::InvariantViolation(what) => write!(f, "invariant violation: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Commit pipeline result.
pub type Result<T> = std::result::Result<T, Error>;
