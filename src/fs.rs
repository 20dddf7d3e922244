// Copyright (c) 2025-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Filesystem abstraction for the "place a file at tier level L" service.
//!
//! The real tiering and disk-selection logic lives outside this crate; here
//! we only need a seam that lets tests swap in a deterministic stand-in
//! without touching the real filesystem semantics (rename, fsync) that the
//! commit protocol depends on.

use std::{fs, io, path::Path};

/// Filesystem operations the commit pipeline needs.
pub trait FileSystem: Send + Sync {
    /// Opens an existing file for reading.
    fn open(path: &Path) -> io::Result<fs::File>;
    /// Creates or truncates a file for writing.
    fn create(path: &Path) -> io::Result<fs::File>;
    /// Opens a file for appending, creating it if missing.
    fn open_append(path: &Path) -> io::Result<fs::File>;
    /// Removes a file. Missing files are not an error.
    fn remove_file_if_exists(path: &Path) -> io::Result<()>;
    /// Atomically replaces `to` with `from`.
    fn rename(from: &Path, to: &Path) -> io::Result<()>;
    /// Checks whether a path exists.
    fn exists(path: &Path) -> io::Result<bool>;
    /// Creates a directory and all missing parents.
    fn create_dir_all(path: &Path) -> io::Result<()>;
}

/// `std::fs`-backed filesystem implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn open(path: &Path) -> io::Result<fs::File> {
        fs::File::open(path)
    }

    fn create(path: &Path) -> io::Result<fs::File> {
        fs::File::create(path)
    }

    fn open_append(path: &Path) -> io::Result<fs::File> {
        fs::OpenOptions::new().create(true).append(true).open(path)
    }

    fn remove_file_if_exists(path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn rename(from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn create_dir_all(path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}
