// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Names and path helpers for the per-file-id `DATA` / `HEAD` / `LAST` triple,
//! plus their shadow-file counterparts used during a commit.

use crate::fs::FileSystem;
use std::path::{Path, PathBuf};

/// Magic bytes stamped at the start of every `SBlockData` and `SBlockInfo` section.
pub const MAGIC_BYTES: [u8; 4] = [b'T', b'S', b'D', 1];

/// Logical kind of file inside a [`crate::file_group::FileGroup`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FileKind {
    Data,
    Head,
    Last,
}

impl FileKind {
    fn extension(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Head => "head",
            Self::Last => "last",
        }
    }
}

/// Computes the on-disk path for a file of `kind` belonging to `fid`, optionally
/// as its shadow ("new") counterpart used while a commit is in flight.
#[must_use]
pub fn group_file_path(root: &Path, fid: i64, kind: FileKind, shadow: bool) -> PathBuf {
    let suffix = if shadow { ".new" } else { "" };
    root.join(format!("{fid}.{}{suffix}", kind.extension()))
}

/// fsyncs the containing directory so a rename is durable, matching the
/// discipline applied after every atomic rewrite below.
#[cfg(not(target_os = "windows"))]
pub fn fsync_directory<F: FileSystem>(path: &Path) -> std::io::Result<()> {
    let file = F::open(path)?;
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory<F: FileSystem>(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn file_paths_are_distinct_per_kind() {
        let root = Path::new("/tmp/groups");
        let data = group_file_path(root, 3, FileKind::Data, false);
        let head = group_file_path(root, 3, FileKind::Head, false);
        let last = group_file_path(root, 3, FileKind::Last, false);
        assert_ne!(data, head);
        assert_ne!(head, last);
    }

    #[test]
    fn shadow_paths_differ_from_real_paths() {
        let root = Path::new("/tmp/groups");
        let real = group_file_path(root, 3, FileKind::Head, false);
        let shadow = group_file_path(root, 3, FileKind::Head, true);
        assert_ne!(real, shadow);
    }
}
