// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CRC-style integrity footprint used by the `SBlockData`/`SBlockInfo` headers
//! and the `HEAD` file footer's `checksum` field.

use xxhash_rust::xxh3::Xxh3Default;

/// A 128-bit checksum over a byte range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(u128);

impl Checksum {
    /// Wraps a raw checksum value (e.g. one just decoded off disk).
    #[must_use]
    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }

    /// Computes the checksum of a byte slice.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Xxh3Default::new();
        hasher.update(bytes);
        Self(hasher.digest128())
    }

    /// Returns the raw 128-bit integer.
    #[must_use]
    pub fn into_u128(self) -> u128 {
        self.0
    }

    /// Verifies this checksum against an expected value.
    pub fn check(&self, expected: Self) -> crate::Result<()> {
        if self.0 == expected.0 {
            Ok(())
        } else {
            Err(crate::Error::InvalidChecksum {
                got: self.0,
                expected: expected.0,
            })
        }
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
