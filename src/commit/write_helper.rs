// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-file-id write helper: opens a file group's shadow files, merges
//! each touched table's new rows into its existing on-disk blocks, and
//! publishes the result via the atomic shadow-rename protocol, following an
//! open/index/commit-table/close sequencing.
//!
//! `DATA` and `LAST` shadow files start as a byte-for-byte copy of the
//! current real file, so every block offset already recorded for an
//! untouched table stays valid in the new file without being rewritten; only
//! `HEAD` (the small per-table directory) is fully reassembled on close.

use super::iter::CommitIter;
use crate::block::data::{decode_block, encode_block};
use crate::block::idx::{HasLast, SBlockIdx};
use crate::block::info::SBlockInfo;
use crate::block::SBlock;
use crate::checksum::Checksum;
use crate::coding::{Decode, Encode};
use crate::config::CommitConfig;
use crate::file::{fsync_directory, group_file_path, FileKind};
use crate::file_group::FileLengths;
use crate::fs::FileSystem;
use crate::schema::TableSchema;
use crate::value::{Key, Row};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

/// `HEAD` wire format version stamped in the footer.
const HEAD_FORMAT_VERSION: u32 = 1;

/// Fixed-size trailer: `count: u32`, `checksum: u128`, `version: u32`.
const HEAD_FOOTER_LEN: usize = 4 + 16 + 4;

/// Lifecycle of a [`WriteHelper`], asserted at the entry of each method.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum HelperState {
    Idle,
    Opened,
    Indexed,
    Closed,
}

/// Drives one file-id's worth of a commit: shadow-open, per-table merge, and
/// the final atomic publish.
pub struct WriteHelper<F: FileSystem> {
    state: HelperState,
    root: PathBuf,
    fid: i64,
    data_file: Option<File>,
    last_file: Option<File>,
    data_len: u64,
    last_len: u64,
    existing: BTreeMap<u32, SBlockInfo>,
    touched: BTreeMap<u32, SBlockInfo>,
    _fs: PhantomData<F>,
}

impl<F: FileSystem> WriteHelper<F> {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, fid: i64) -> Self {
        Self {
            state: HelperState::Idle,
            root: root.into(),
            fid,
            data_file: None,
            last_file: None,
            data_len: 0,
            last_len: 0,
            existing: BTreeMap::new(),
            touched: BTreeMap::new(),
            _fs: PhantomData,
        }
    }

    /// Opens (copy-forward) the `DATA`/`LAST` shadow files and loads the
    /// existing `HEAD` directory, so untouched tables can be carried forward
    /// unchanged.
    pub fn open(&mut self) -> crate::Result<()> {
        debug_assert_eq!(HelperState::Idle, self.state);

        let (data_file, data_len) = open_shadow_copy::<F>(
            &group_file_path(&self.root, self.fid, FileKind::Data, false),
            &group_file_path(&self.root, self.fid, FileKind::Data, true),
        )?;
        let (last_file, last_len) = open_shadow_copy::<F>(
            &group_file_path(&self.root, self.fid, FileKind::Last, false),
            &group_file_path(&self.root, self.fid, FileKind::Last, true),
        )?;

        self.data_file = Some(data_file);
        self.data_len = data_len;
        self.last_file = Some(last_file);
        self.last_len = last_len;
        self.state = HelperState::Opened;

        self.load_comp_idx()
    }

    fn load_comp_idx(&mut self) -> crate::Result<()> {
        debug_assert_eq!(HelperState::Opened, self.state);

        let head_real = group_file_path(&self.root, self.fid, FileKind::Head, false);
        if F::exists(&head_real)? {
            let mut file = F::open(&head_real)?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;

            if buf.len() < HEAD_FOOTER_LEN {
                return Err(crate::Error::CorruptBlock("HEAD shorter than its footer"));
            }

            let footer_start = buf.len() - HEAD_FOOTER_LEN;
            let mut footer = Cursor::new(&buf[footer_start..]);
            let count = footer.read_u32::<LittleEndian>()?;
            let expected_checksum = Checksum::from_raw(footer.read_u128::<LittleEndian>()?);
            let _version = footer.read_u32::<LittleEndian>()?;

            Checksum::of(&buf[..footer_start]).check(expected_checksum)?;

            let idx_len = count as usize * SBlockIdx::serialized_len();
            let idx_start = footer_start
                .checked_sub(idx_len)
                .ok_or(crate::Error::CorruptBlock("HEAD index table overruns footer"))?;

            let mut idx_cursor = Cursor::new(&buf[idx_start..footer_start]);
            let mut idxs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                idxs.push(SBlockIdx::decode_from(&mut idx_cursor)?);
            }

            for idx in idxs {
                let start = idx.offset as usize;
                let end = start
                    .checked_add(idx.len as usize)
                    .ok_or(crate::Error::CorruptBlock("SBlockIdx length overflows HEAD"))?;
                let slice = buf
                    .get(start..end)
                    .ok_or(crate::Error::CorruptBlock("SBlockIdx points outside HEAD"))?;
                let info = SBlockInfo::decode_from(&mut Cursor::new(slice))?;
                self.existing.insert(idx.tid, info);
            }
        }

        self.state = HelperState::Indexed;
        Ok(())
    }

    /// Reads back the rows of one existing, on-disk block belonging to this
    /// file-id, from the *real* (not-yet-renamed) `DATA`/`LAST` file.
    fn read_block_rows(&self, block: &SBlock, schema: &TableSchema) -> crate::Result<Vec<Row>> {
        let path = group_file_path(
            &self.root,
            self.fid,
            if block.last { FileKind::Last } else { FileKind::Data },
            false,
        );
        let mut file = F::open(&path)?;
        file.seek(SeekFrom::Start(block.offset))?;

        let mut buf = vec![0u8; block.len as usize];
        file.read_exact(&mut buf)?;

        decode_block(&buf, schema, block.algorithm, block.num_of_rows as usize)
    }

    /// Merges `iter`'s rows into this table's existing blocks (if any),
    /// re-chunks by `config`'s block-size thresholds, and flushes the result
    /// into the open shadow `DATA`/`LAST` files.
    pub fn commit_table(
        &mut self,
        schema: &TableSchema,
        iter: &mut CommitIter<'_>,
        config: &CommitConfig,
        max_key: Option<Key>,
    ) -> crate::Result<()> {
        debug_assert_eq!(HelperState::Indexed, self.state);

        let mut merged: BTreeMap<Key, Row> = BTreeMap::new();
        let mut preserved_blocks: Vec<SBlock> = Vec::new();

        if let Some(existing_info) = self.existing.remove(&schema.tid) {
            let mut blocks = existing_info.blocks;

            // Only the trailing block (the `LAST` sub-block, or the final
            // `DATA` block if there's no `LAST` yet) can still take new rows;
            // earlier blocks are already full and their bytes are already
            // copy-forwarded verbatim into the shadow file, so they carry
            // forward unchanged rather than being re-read and rewritten.
            if let Some(last_block) = blocks.pop() {
                for row in self.read_block_rows(&last_block, schema)? {
                    merged.insert(row.ts, row);
                }
            }

            preserved_blocks = blocks;
        }

        while iter.peek_key().is_some_and(|k| max_key.is_none_or(|m| k <= m)) {
            let row = iter.take().expect("peek_key just confirmed a row is present");
            merged.insert(row.ts, row);
        }

        if merged.is_empty() {
            return Ok(());
        }

        let rows: Vec<Row> = merged.into_values().collect();
        let max_rows = config.max_rows_per_file_block as usize;
        let min_rows = config.min_rows_per_file_block as usize;

        let chunks: Vec<&[Row]> = rows.chunks(max_rows).collect();
        let mut blocks = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let is_final = i + 1 == chunks.len();
            let goes_to_last = is_final && chunk.len() < min_rows;

            let encoded = encode_block(chunk, schema)?;

            let (file, len) = if goes_to_last {
                (self.last_file.as_mut().expect("opened"), &mut self.last_len)
            } else {
                (self.data_file.as_mut().expect("opened"), &mut self.data_len)
            };

            let offset = *len;
            file.write_all(&encoded.bytes)?;
            *len += encoded.bytes.len() as u64;

            blocks.push(SBlock {
                last: goes_to_last,
                offset,
                algorithm: encoded.algorithm,
                num_of_rows: encoded.num_of_rows,
                len: encoded.bytes.len() as u32,
                key_len: encoded.key_len,
                num_of_sub_blocks: 1,
                num_of_cols: encoded.num_of_cols,
                key_first: encoded.key_first,
                key_last: encoded.key_last,
            });
        }

        preserved_blocks.extend(blocks);

        let info = SBlockInfo::new(schema.tid, schema.uid, preserved_blocks);
        info.validate()?;
        self.touched.insert(schema.tid, info);

        Ok(())
    }

    /// Publishes the commit (`keep = true`) by fsyncing and renaming the
    /// shadow files into place, or discards it (`keep = false`) by deleting
    /// the shadow files, leaving the pre-commit state untouched: visibility
    /// is atomic and all-or-nothing.
    ///
    /// Returns the published file group's byte lengths; these are whatever
    /// [`FileLengths::default`] gives when nothing was kept.
    pub fn close(mut self, keep: bool) -> crate::Result<FileLengths> {
        debug_assert!(matches!(self.state, HelperState::Indexed | HelperState::Opened));

        let data_shadow = group_file_path(&self.root, self.fid, FileKind::Data, true);
        let last_shadow = group_file_path(&self.root, self.fid, FileKind::Last, true);
        let head_shadow = group_file_path(&self.root, self.fid, FileKind::Head, true);

        let sync_result = (|| -> crate::Result<()> {
            if let Some(file) = &self.data_file {
                file.sync_all()?;
            }
            if let Some(file) = &self.last_file {
                file.sync_all()?;
            }
            Ok(())
        })();
        self.data_file.take();
        self.last_file.take();

        let result = sync_result.and_then(|()| {
            if keep {
                self.publish(&data_shadow, &last_shadow, &head_shadow)
            } else {
                Ok(FileLengths::default())
            }
        });

        if result.is_err() || !keep {
            // Discard path, and the cleanup half of a failed publish: a
            // renamed file is gone already, so removing it here is a no-op.
            let _ = F::remove_file_if_exists(&data_shadow);
            let _ = F::remove_file_if_exists(&last_shadow);
            let _ = F::remove_file_if_exists(&head_shadow);
        }

        self.state = HelperState::Closed;
        result
    }

    /// Writes the new `HEAD` and renames `DATA`/`LAST`/`HEAD` shadow files
    /// over their real counterparts, in that order: a new block is only ever
    /// referenced from `HEAD`, so as long as `HEAD` is renamed last, a
    /// failure partway through this sequence leaves the old `HEAD` pointing
    /// at valid (if now-stale) offsets in whatever of `DATA`/`LAST` *did*
    /// get renamed — readers never observe a block `HEAD` doesn't know about.
    fn publish(&mut self, data_shadow: &std::path::Path, last_shadow: &std::path::Path, head_shadow: &std::path::Path) -> crate::Result<FileLengths> {
        let head_bytes = self.build_head_bytes()?;
        let mut head_file = F::create(head_shadow)?;
        head_file.write_all(&head_bytes)?;
        head_file.sync_all()?;

        let data_real = group_file_path(&self.root, self.fid, FileKind::Data, false);
        let last_real = group_file_path(&self.root, self.fid, FileKind::Last, false);
        let head_real = group_file_path(&self.root, self.fid, FileKind::Head, false);

        F::rename(data_shadow, &data_real)?;
        F::rename(last_shadow, &last_real)?;
        F::rename(head_shadow, &head_real)?;

        fsync_directory::<F>(&self.root)?;

        log::debug!("published file-group fid={}", self.fid);

        Ok(FileLengths {
            data_len: self.data_len,
            last_len: self.last_len,
            head_len: head_bytes.len() as u64,
        })
    }

    /// Lays `HEAD` out as `SBlockInfo` sections, then the `SBlockIdx[]` table,
    /// then a fixed-size footer (`count`, `checksum`, `version`) a reader
    /// locates by seeking from the end of the file rather than its start.
    fn build_head_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut all: Vec<&SBlockInfo> = self.existing.values().chain(self.touched.values()).collect();
        all.sort_by_key(|info| info.tid);

        let mut info_bytes = Vec::new();
        let mut idx_entries = Vec::with_capacity(all.len());

        for info in &all {
            let offset = info_bytes.len() as u64;
            info.encode_into(&mut info_bytes)?;
            let len = info_bytes.len() as u64 - offset;

            let max_key = info.blocks.last().map_or(i64::MIN, |b| b.key_last);
            let has_last = if info.blocks.last().is_some_and(|b| b.last) {
                HasLast::Yes
            } else {
                HasLast::No
            };

            idx_entries.push(SBlockIdx {
                tid: info.tid,
                uid: info.uid,
                offset,
                len: len as u32,
                num_of_blocks: info.blocks.len() as u32,
                has_last,
                max_key,
            });
        }

        let mut out = info_bytes;
        for idx in &idx_entries {
            idx.encode_into(&mut out)?;
        }

        let checksum = Checksum::of(&out);
        out.write_u32::<LittleEndian>(idx_entries.len() as u32)?;
        out.write_u128::<LittleEndian>(checksum.into_u128())?;
        out.write_u32::<LittleEndian>(HEAD_FORMAT_VERSION)?;

        Ok(out)
    }
}

fn open_shadow_copy<F: FileSystem>(real: &std::path::Path, shadow: &std::path::Path) -> crate::Result<(File, u64)> {
    let mut shadow_file = F::create(shadow)?;
    let mut len = 0u64;

    if F::exists(real)? {
        let mut real_file = F::open(real)?;
        len = real_file.metadata()?.len();
        std::io::copy(&mut real_file, &mut shadow_file)?;
    }

    Ok((shadow_file, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFileSystem;
    use crate::memtable::TableMemtable;
    use crate::schema::{ColumnSchema, ColumnType};
    use crate::value::ColumnValue;
    use test_log::test;

    fn schema() -> TableSchema {
        TableSchema::new(1, 7, vec![ColumnSchema::new(1, "v", ColumnType::Int64)])
    }

    fn config() -> CommitConfig {
        CommitConfig::new("/tmp/unused")
            .max_rows_per_file_block(4)
            .min_rows_per_file_block(2)
            .build()
            .unwrap()
    }

    #[test]
    fn commit_then_reopen_round_trips_rows() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let schema = schema();
        let config = config();

        let table = TableMemtable::new(schema.clone());
        for ts in 0..6 {
            table.insert(Row::new(ts, vec![Some(ColumnValue::Int64(ts * 10))]));
        }

        {
            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let mut iter = CommitIter::new(&table, None);
            helper.commit_table(&schema, &mut iter, &config, None)?;
            helper.close(true)?;
        }

        // Reopen and verify the HEAD/DATA/LAST triple round-trips through a
        // second helper (as a fresh commit would see it).
        let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
        helper.open()?;
        let info = helper.existing.get(&schema.tid).expect("table carried forward");
        let total_rows: u32 = info.blocks.iter().map(|b| b.num_of_rows).sum();
        assert_eq!(6, total_rows);

        Ok(())
    }

    #[test]
    fn upsert_overwrites_existing_value_on_second_commit() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let schema = schema();
        let config = config();

        let first = TableMemtable::new(schema.clone());
        first.insert(Row::new(1, vec![Some(ColumnValue::Int64(100))]));

        {
            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let mut iter = CommitIter::new(&first, None);
            helper.commit_table(&schema, &mut iter, &config, None)?;
            helper.close(true)?;
        }

        let second = TableMemtable::new(schema.clone());
        second.insert(Row::new(1, vec![Some(ColumnValue::Int64(999))]));

        {
            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let mut iter = CommitIter::new(&second, None);
            helper.commit_table(&schema, &mut iter, &config, None)?;
            helper.close(true)?;
        }

        let helper = {
            let mut h = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            h.open()?;
            h
        };
        let info = helper.existing.get(&schema.tid).unwrap();
        assert_eq!(1, info.blocks.len());
        let rows = helper.read_block_rows(&info.blocks[0], &schema)?;
        assert_eq!(1, rows.len());
        assert_eq!(Some(ColumnValue::Int64(999)), rows[0].cols[0]);

        Ok(())
    }

    #[test]
    fn discarded_commit_leaves_no_trace() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let schema = schema();
        let config = config();

        let table = TableMemtable::new(schema.clone());
        table.insert(Row::new(1, vec![Some(ColumnValue::Int64(1))]));

        let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
        helper.open()?;
        let mut iter = CommitIter::new(&table, None);
        helper.commit_table(&schema, &mut iter, &config, None)?;
        helper.close(false)?;

        assert!(!group_file_path(dir.path(), 0, FileKind::Head, false).exists());
        assert!(!group_file_path(dir.path(), 0, FileKind::Data, true).exists());

        Ok(())
    }

    #[test]
    fn second_commit_leaves_earlier_full_blocks_at_their_original_offset() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let schema = schema();
        let config = config();

        // max_rows_per_file_block=4: a first commit of 8 rows lands in two
        // full DATA blocks. Only the trailing one of those two may still be
        // touched by a later commit; the first must survive unread/unwritten.
        let first = TableMemtable::new(schema.clone());
        for ts in 0..8 {
            first.insert(Row::new(ts, vec![Some(ColumnValue::Int64(ts))]));
        }

        let first_block_offset = {
            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let mut iter = CommitIter::new(&first, None);
            helper.commit_table(&schema, &mut iter, &config, None)?;
            helper.close(true)?;

            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let info = helper.existing.get(&schema.tid).unwrap();
            assert_eq!(2, info.blocks.len());
            info.blocks[0].offset
        };

        let second = TableMemtable::new(schema.clone());
        second.insert(Row::new(8, vec![Some(ColumnValue::Int64(8))]));

        {
            let mut helper = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            helper.open()?;
            let mut iter = CommitIter::new(&second, None);
            helper.commit_table(&schema, &mut iter, &config, None)?;
            helper.close(true)?;
        }

        let helper = {
            let mut h = WriteHelper::<StdFileSystem>::new(dir.path(), 0);
            h.open()?;
            h
        };
        let info = helper.existing.get(&schema.tid).unwrap();

        // The first block's offset and row count are untouched; only the
        // second (formerly trailing) block was merged with the new row and
        // re-chunked into a full block plus a one-row LAST sub-block.
        assert_eq!(first_block_offset, info.blocks[0].offset);
        assert_eq!(4, info.blocks[0].num_of_rows);
        assert_eq!(3, info.blocks.len());
        assert_eq!(4, info.blocks[1].num_of_rows);
        assert_eq!(1, info.blocks[2].num_of_rows);
        assert!(info.blocks[2].last);

        Ok(())
    }
}
