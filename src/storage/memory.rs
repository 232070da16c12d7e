// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory storage backends for tests and embedded deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::tso::{Timestamp, NO_TIMESTAMP};

use super::column::{Cell, ColumnStore, Value};
use super::commit_table::{CommitRecord, CommitTable};
use super::error::StorageError;
use super::timestamp::TimestampStorage;

/// In-memory [`TimestampStorage`].
#[derive(Default)]
pub struct InMemoryTimestampStorage {
    max_timestamp: Mutex<Timestamp>,
}

impl InMemoryTimestampStorage {
    /// Creates storage with a zero watermark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage seeded with an existing watermark.
    pub fn with_watermark(watermark: Timestamp) -> Self {
        Self {
            max_timestamp: Mutex::new(watermark),
        }
    }
}

impl TimestampStorage for InMemoryTimestampStorage {
    fn read(&self) -> Result<Timestamp, StorageError> {
        Ok(*self.max_timestamp.lock())
    }

    fn compare_and_update(&self, prev: Timestamp, next: Timestamp) -> Result<(), StorageError> {
        let mut stored = self.max_timestamp.lock();
        if *stored != prev {
            return Err(StorageError::WatermarkMismatch {
                expected: prev,
                found: *stored,
            });
        }
        *stored = next;
        Ok(())
    }
}

enum CommitEntry {
    Committed(CommitRecord),
    Invalidated,
}

/// In-memory [`CommitTable`].
#[derive(Default)]
pub struct InMemoryCommitTable {
    entries: RwLock<HashMap<Timestamp, CommitEntry>>,
    low_watermark: AtomicU64,
}

impl InMemoryCommitTable {
    /// Creates an empty commit table.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitTable for InMemoryCommitTable {
    fn put(&self, start_ts: Timestamp, record: CommitRecord) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        match entries.get(&start_ts) {
            Some(CommitEntry::Invalidated) => Err(StorageError::EntryInvalidated { start_ts }),
            _ => {
                entries.insert(start_ts, CommitEntry::Committed(record));
                Ok(())
            }
        }
    }

    fn get(&self, start_ts: Timestamp) -> Result<Option<CommitRecord>, StorageError> {
        Ok(match self.entries.read().get(&start_ts) {
            Some(CommitEntry::Committed(record)) => Some(record.clone()),
            Some(CommitEntry::Invalidated) | None => None,
        })
    }

    fn invalidate(&self, start_ts: Timestamp) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        if !matches!(entries.get(&start_ts), Some(CommitEntry::Committed(_))) {
            entries.insert(start_ts, CommitEntry::Invalidated);
        }
        Ok(())
    }

    fn checkpoint_low_watermark(&self, low_watermark: Timestamp) -> Result<(), StorageError> {
        self.low_watermark.store(low_watermark, Ordering::Release);
        Ok(())
    }

    fn low_watermark_checkpoint(&self) -> Result<Timestamp, StorageError> {
        Ok(self.low_watermark.load(Ordering::Acquire))
    }
}

#[derive(Default)]
struct ColumnStoreInner {
    cells: BTreeMap<Cell, BTreeMap<Timestamp, Value>>,
    shadows: HashMap<(Cell, Timestamp), Timestamp>,
}

/// In-memory [`ColumnStore`].
#[derive(Default)]
pub struct MemoryColumnStore {
    inner: RwLock<ColumnStoreInner>,
}

impl MemoryColumnStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live versions across all cells. Test hook.
    pub fn version_count(&self) -> usize {
        self.inner.read().cells.values().map(BTreeMap::len).sum()
    }
}

impl ColumnStore for MemoryColumnStore {
    fn put(&self, cell: &Cell, version: Timestamp, value: Value) -> Result<(), StorageError> {
        self.inner
            .write()
            .cells
            .entry(cell.clone())
            .or_default()
            .insert(version, value);
        Ok(())
    }

    fn put_shadow(
        &self,
        cell: &Cell,
        version: Timestamp,
        commit_ts: Timestamp,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .shadows
            .insert((cell.clone(), version), commit_ts);
        Ok(())
    }

    fn shadow(&self, cell: &Cell, version: Timestamp) -> Result<Option<Timestamp>, StorageError> {
        Ok(self
            .inner
            .read()
            .shadows
            .get(&(cell.clone(), version))
            .copied())
    }

    fn versions(
        &self,
        cell: &Cell,
        max_version: Timestamp,
    ) -> Result<Vec<(Timestamp, Value)>, StorageError> {
        let inner = self.inner.read();
        Ok(match inner.cells.get(cell) {
            Some(versions) => versions
                .range(NO_TIMESTAMP..=max_version)
                .rev()
                .map(|(ts, value)| (*ts, value.clone()))
                .collect(),
            None => Vec::new(),
        })
    }

    fn delete(&self, cell: &Cell, version: Timestamp) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(versions) = inner.cells.get_mut(cell) {
            versions.remove(&version);
            if versions.is_empty() {
                inner.cells.remove(cell);
            }
        }
        inner.shadows.remove(&(cell.clone(), version));
        Ok(())
    }

    fn scan(
        &self,
        table: &[u8],
        family: &[u8],
        start_row: &[u8],
        end_row: &[u8],
        max_version: Timestamp,
    ) -> Result<Vec<(Cell, Vec<(Timestamp, Value)>)>, StorageError> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (cell, versions) in &inner.cells {
            if cell.table != table || cell.family != family {
                continue;
            }
            if cell.row.as_slice() < start_row || cell.row.as_slice() >= end_row {
                continue;
            }
            let versions: Vec<_> = versions
                .range(NO_TIMESTAMP..=max_version)
                .rev()
                .map(|(ts, value)| (*ts, value.clone()))
                .collect();
            if !versions.is_empty() {
                out.push((cell.clone(), versions));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_storage_compare_and_update() {
        let storage = InMemoryTimestampStorage::new();
        assert_eq!(storage.read().unwrap(), 0);

        storage.compare_and_update(0, 100).unwrap();
        assert_eq!(storage.read().unwrap(), 100);

        let err = storage.compare_and_update(0, 200).unwrap_err();
        assert!(matches!(
            err,
            StorageError::WatermarkMismatch {
                expected: 0,
                found: 100
            }
        ));
        assert_eq!(storage.read().unwrap(), 100);
    }

    #[test]
    fn commit_table_put_get() {
        let table = InMemoryCommitTable::new();
        assert_eq!(table.get(5).unwrap(), None);

        table.put(5, CommitRecord::new(9)).unwrap();
        assert_eq!(table.get(5).unwrap(), Some(CommitRecord::new(9)));
    }

    #[test]
    fn commit_table_preserves_elder_conflict_rows() {
        let table = InMemoryCommitTable::new();
        let record = CommitRecord {
            commit_ts: 9,
            conflict_rows: vec![7, 11],
        };
        table.put(5, record.clone()).unwrap();

        let stored = table.get(5).unwrap().unwrap();
        assert!(stored.is_elder());
        assert_eq!(stored, record);
    }

    #[test]
    fn commit_table_invalidate_does_not_displace_a_commit() {
        let table = InMemoryCommitTable::new();
        table.put(5, CommitRecord::new(9)).unwrap();
        table.invalidate(5).unwrap();
        assert_eq!(table.get(5).unwrap(), Some(CommitRecord::new(9)));
    }

    #[test]
    fn commit_table_invalidate_wins_over_put() {
        let table = InMemoryCommitTable::new();
        table.invalidate(5).unwrap();

        let err = table.put(5, CommitRecord::new(9)).unwrap_err();
        assert!(matches!(err, StorageError::EntryInvalidated { start_ts: 5 }));
        assert_eq!(table.get(5).unwrap(), None);
    }

    #[test]
    fn commit_table_low_watermark_roundtrip() {
        let table = InMemoryCommitTable::new();
        assert_eq!(table.low_watermark_checkpoint().unwrap(), 0);
        table.checkpoint_low_watermark(42).unwrap();
        assert_eq!(table.low_watermark_checkpoint().unwrap(), 42);
    }

    #[test]
    fn column_store_versions_newest_first() {
        let store = MemoryColumnStore::new();
        let cell = Cell::new("t", "row", "f", "q");

        store.put(&cell, 3, Value::from("v3")).unwrap();
        store.put(&cell, 1, Value::from("v1")).unwrap();
        store.put(&cell, 7, Value::from("v7")).unwrap();

        let versions = store.versions(&cell, 5).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0], (3, Value::from("v3")));
        assert_eq!(versions[1], (1, Value::from("v1")));
    }

    #[test]
    fn column_store_delete_removes_shadow() {
        let store = MemoryColumnStore::new();
        let cell = Cell::new("t", "row", "f", "q");

        store.put(&cell, 3, Value::from("v3")).unwrap();
        store.put_shadow(&cell, 3, 8).unwrap();
        assert_eq!(store.shadow(&cell, 3).unwrap(), Some(8));

        store.delete(&cell, 3).unwrap();
        assert_eq!(store.shadow(&cell, 3).unwrap(), None);
        assert!(store.versions(&cell, u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn column_store_scan_filters_rows() {
        let store = MemoryColumnStore::new();
        for row in [&b"a"[..], b"b", b"c"] {
            let cell = Cell::new(&b"t"[..], row, &b"f"[..], &b"q"[..]);
            store.put(&cell, 1, Value::from("v")).unwrap();
        }

        let hits = store.scan(b"t", b"f", b"a", b"c", u64::MAX).unwrap();
        let rows: Vec<_> = hits.iter().map(|(cell, _)| cell.row.clone()).collect();
        assert_eq!(rows, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
