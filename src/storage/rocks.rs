// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RocksDB-backed oracle watermark and commit table.

use std::path::Path;

use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteOptions};

use crate::tso::Timestamp;

use super::commit_table::{CommitRecord, CommitTable};
use super::error::StorageError;
use super::timestamp::TimestampStorage;

const MAX_TIMESTAMP_KEY: &[u8] = b"max_timestamp";
const LOW_WATERMARK_KEY: &[u8] = b"low_watermark";

const ENTRY_COMMITTED: u8 = 0;
const ENTRY_INVALIDATED: u8 = 1;

type Db = DBWithThreadMode<MultiThreaded>;

fn open_db(path: &Path) -> Result<Db, StorageError> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_write_buffer_size(16 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    Ok(Db::open(&opts, path)?)
}

fn sync_write_opts() -> WriteOptions {
    let mut write_opts = WriteOptions::default();
    write_opts.set_sync(true);
    write_opts
}

fn decode_u64(bytes: &[u8]) -> Result<Timestamp, StorageError> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corruption(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// RocksDB-backed [`TimestampStorage`].
///
/// Every update is fsynced: the oracle's correctness depends on the stored
/// ceiling surviving a crash. A single oracle instance owns the counter at a
/// time; `compare_and_update` rejects a stale owner.
pub struct RocksTimestampStorage {
    db: Db,
    write_opts: WriteOptions,
}

impl RocksTimestampStorage {
    /// Opens or creates the watermark database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            db: open_db(path)?,
            write_opts: sync_write_opts(),
        })
    }
}

impl TimestampStorage for RocksTimestampStorage {
    fn read(&self) -> Result<Timestamp, StorageError> {
        match self.db.get(MAX_TIMESTAMP_KEY)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    fn compare_and_update(&self, prev: Timestamp, next: Timestamp) -> Result<(), StorageError> {
        let found = self.read()?;
        if found != prev {
            return Err(StorageError::WatermarkMismatch {
                expected: prev,
                found,
            });
        }
        self.db
            .put_opt(MAX_TIMESTAMP_KEY, next.to_be_bytes(), &self.write_opts)?;
        Ok(())
    }
}

/// RocksDB-backed [`CommitTable`].
///
/// Commit entries are keyed by the 8-byte big-endian start timestamp; the
/// value is a one-byte tag (committed or invalidated), the commit timestamp,
/// and the elder conflict-row fingerprints, 8 bytes each. Commit publishes
/// are fsynced; the low-watermark checkpoint is advisory and written without
/// sync.
pub struct RocksCommitTable {
    db: Db,
    write_opts: WriteOptions,
}

impl RocksCommitTable {
    /// Opens or creates the commit table database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            db: open_db(path)?,
            write_opts: sync_write_opts(),
        })
    }

    fn entry(&self, start_ts: Timestamp) -> Result<Option<(u8, CommitRecord)>, StorageError> {
        match self.db.get(start_ts.to_be_bytes())? {
            Some(bytes) if bytes.len() >= 9 && (bytes.len() - 9) % 8 == 0 => {
                let commit_ts = decode_u64(&bytes[1..9])?;
                let mut conflict_rows = Vec::with_capacity((bytes.len() - 9) / 8);
                for chunk in bytes[9..].chunks_exact(8) {
                    conflict_rows.push(decode_u64(chunk)?);
                }
                Ok(Some((
                    bytes[0],
                    CommitRecord {
                        commit_ts,
                        conflict_rows,
                    },
                )))
            }
            Some(bytes) => Err(StorageError::Corruption(format!(
                "commit entry for {} has {} bytes",
                start_ts,
                bytes.len()
            ))),
            None => Ok(None),
        }
    }

    fn write_entry(
        &self,
        start_ts: Timestamp,
        tag: u8,
        record: &CommitRecord,
    ) -> Result<(), StorageError> {
        let mut value = Vec::with_capacity(9 + 8 * record.conflict_rows.len());
        value.push(tag);
        value.extend_from_slice(&record.commit_ts.to_be_bytes());
        for fingerprint in &record.conflict_rows {
            value.extend_from_slice(&fingerprint.to_be_bytes());
        }
        self.db
            .put_opt(start_ts.to_be_bytes(), value, &self.write_opts)?;
        Ok(())
    }
}

impl CommitTable for RocksCommitTable {
    fn put(&self, start_ts: Timestamp, record: CommitRecord) -> Result<(), StorageError> {
        // The only writers for a given start_ts are its decider and its
        // owning client, and the client only invalidates after it has given
        // up on the decider's response.
        if let Some((ENTRY_INVALIDATED, _)) = self.entry(start_ts)? {
            return Err(StorageError::EntryInvalidated { start_ts });
        }
        self.write_entry(start_ts, ENTRY_COMMITTED, &record)
    }

    fn get(&self, start_ts: Timestamp) -> Result<Option<CommitRecord>, StorageError> {
        Ok(match self.entry(start_ts)? {
            Some((ENTRY_COMMITTED, record)) => Some(record),
            _ => None,
        })
    }

    fn invalidate(&self, start_ts: Timestamp) -> Result<(), StorageError> {
        if let Some((ENTRY_COMMITTED, _)) = self.entry(start_ts)? {
            return Ok(());
        }
        self.write_entry(start_ts, ENTRY_INVALIDATED, &CommitRecord::new(0))
    }

    fn checkpoint_low_watermark(&self, low_watermark: Timestamp) -> Result<(), StorageError> {
        self.db
            .put(LOW_WATERMARK_KEY, low_watermark.to_be_bytes())?;
        Ok(())
    }

    fn low_watermark_checkpoint(&self) -> Result<Timestamp, StorageError> {
        match self.db.get(LOW_WATERMARK_KEY)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }
}
