// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The client-side transaction manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::storage::{Cell, ColumnStore, CommitRecord, Value};
use crate::tso::{
    CommitRequest, MultiCommitRequest, PrepareCommit, RowFingerprint, Timestamp, TsoError,
    TsoRequest, TsoResponse, NO_TIMESTAMP,
};

use super::error::TxnError;
use super::row::{fingerprint, RowWrite};
use super::runtime::TxnRuntime;
use super::transaction::{PartitionTxn, Transaction, TxnKind, TxnStatus};

#[derive(Default)]
struct PartitionPolicy {
    usage: HashMap<usize, u64>,
    force_global: bool,
}

impl PartitionPolicy {
    /// The most-used partition; the first one when there is no history.
    /// A client that sticks to one partition keeps landing on it.
    fn most_used(&self) -> usize {
        self.usage
            .iter()
            .max_by_key(|&(partition, count)| (*count, std::cmp::Reverse(*partition)))
            .map(|(partition, _)| *partition)
            .unwrap_or(0)
    }

    fn record(&mut self, partition: usize) {
        *self.usage.entry(partition).or_insert(0) += 1;
    }
}

/// Drives transactions against the column store and the status oracles.
///
/// Writes go to the store speculatively at the start timestamp; reads filter
/// versions by resolving each one's commit timestamp through its shadow cell
/// or, failing that, the partition's commit table (repairing the shadow cell
/// on the way). Commit sends the transaction's fingerprint sets to the
/// decider and then annotates, reincarnates or deletes the speculative
/// versions according to the decision.
///
/// The manager is shared across caller threads; each transaction's state is
/// owned by its caller.
pub struct TransactionManager {
    runtime: Arc<TxnRuntime>,
    store: Arc<dyn ColumnStore>,
    rpc_timeout: Duration,
    policy: Mutex<PartitionPolicy>,
}

impl TransactionManager {
    /// Creates a manager over a runtime and a column store.
    pub fn new(runtime: Arc<TxnRuntime>, store: Arc<dyn ColumnStore>) -> Self {
        Self {
            runtime,
            store,
            rpc_timeout: Duration::from_secs(5),
            policy: Mutex::new(PartitionPolicy::default()),
        }
    }

    /// Sets the timeout for commit requests. On expiry the outcome is
    /// unknown and gets resolved through the commit table.
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Begins a transaction on the most-used partition.
    ///
    /// After a failed local commit or an out-of-partition write, the next
    /// call starts a global transaction instead.
    pub async fn begin(&self) -> Result<Transaction, TxnError> {
        let start_global = std::mem::take(&mut self.policy.lock().force_global);
        if start_global {
            return self.begin_global().await;
        }

        let partition = self.policy.lock().most_used();
        let start_ts = self.runtime.partitions()[partition]
            .tso
            .timestamp(self.runtime.client_id(), None)
            .await?;
        self.policy.lock().record(partition);
        debug!(start_ts, partition, "begin");
        Ok(Transaction::local(partition, start_ts))
    }

    /// Begins a global transaction: one sequence number, one start timestamp
    /// from every partition, ordered by the sequencer.
    pub async fn begin_global(&self) -> Result<Transaction, TxnError> {
        let sequence = self.runtime.next_sequence();
        let vts = self
            .runtime
            .sequencer()
            .global_timestamps(self.runtime.client_id(), sequence)
            .await?;
        debug!(sequence, ?vts, "begin global");
        Ok(Transaction::global(sequence, vts))
    }

    /// Stages a row write and writes its speculative versions to the store
    /// at the start timestamp. The shadow cells stay absent until commit.
    pub fn put(&self, txn: &mut Transaction, write: RowWrite) -> Result<(), TxnError> {
        Self::ensure_active(txn)?;
        let partition = self.route(txn, &write.row)?;
        let part = txn.part_mut(partition);
        for (qualifier, value) in &write.cells {
            let cell = Cell::new(
                write.table.clone(),
                write.row.clone(),
                write.family.clone(),
                qualifier.clone(),
            );
            self.store.put(&cell, part.start_ts, value.clone())?;
        }
        part.writes.push(write);
        Ok(())
    }

    /// Reads one cell at the transaction's snapshot and records the read for
    /// commit-time validation.
    pub fn get(&self, txn: &mut Transaction, cell: &Cell) -> Result<Option<Value>, TxnError> {
        Self::ensure_active(txn)?;
        let partition = self.route(txn, &cell.row)?;
        let part = txn.part_mut(partition);
        part.reads
            .insert(fingerprint(&cell.table, &cell.row, &cell.family));
        let snapshot = part.start_ts;

        for (version, value) in self.store.versions(cell, snapshot)? {
            if self.version_visible(partition, cell, version, snapshot)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Scans `[start_row, end_row)` of one table and family at the
    /// transaction's snapshot, recording a read per returned row.
    ///
    /// A local transaction's scan is clipped to its partition's range; a
    /// global one fans out across every partition the range touches.
    pub fn scan(
        &self,
        txn: &mut Transaction,
        table: &[u8],
        family: &[u8],
        start_row: &[u8],
        end_row: &[u8],
    ) -> Result<Vec<(Cell, Value)>, TxnError> {
        Self::ensure_active(txn)?;
        let plans: Vec<(usize, Timestamp, Vec<u8>, Vec<u8>)> = txn
            .parts
            .iter()
            .filter_map(|part| {
                let range = &self.runtime.partitions()[part.partition].range;
                range
                    .clip(start_row, end_row)
                    .map(|(start, end)| (part.partition, part.start_ts, start, end))
            })
            .collect();

        let mut out = Vec::new();
        for (partition, snapshot, start, end) in plans {
            for (cell, versions) in self.store.scan(table, family, &start, &end, snapshot)? {
                txn.part_mut(partition)
                    .reads
                    .insert(fingerprint(&cell.table, &cell.row, &cell.family));
                let mut chosen = None;
                for (version, value) in versions {
                    if self.version_visible(partition, &cell, version, snapshot)? {
                        chosen = Some(value);
                        break;
                    }
                }
                if let Some(value) = chosen {
                    out.push((cell, value));
                }
            }
        }
        Ok(out)
    }

    /// Commits the transaction.
    ///
    /// On rejection the speculative versions are deleted and the oracle is
    /// told cleanup finished; the error is [`TxnError::CommitRejected`].
    pub async fn commit(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        Self::ensure_active(txn)?;
        match txn.kind {
            TxnKind::Local => self.commit_local(txn).await,
            TxnKind::Global { .. } => self.commit_global(txn).await,
        }
    }

    /// Aborts the transaction, deleting every speculative version.
    pub fn abort(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        Self::ensure_active(txn)?;
        for part in &mut txn.parts {
            part.commit_ts = NO_TIMESTAMP;
        }
        for part in &txn.parts {
            self.cleanup(part)?;
        }
        txn.status = TxnStatus::Aborted;
        debug!(start_ts = txn.start_ts(), "abort done");
        Ok(())
    }

    async fn commit_local(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        let (partition, start_ts, request) = {
            let part = &txn.parts[0];
            (
                part.partition,
                part.start_ts,
                CommitRequest {
                    start_ts: part.start_ts,
                    writes: part.write_fingerprints(),
                    reads: part.read_fingerprints(),
                },
            )
        };
        trace!(start_ts, "trying commit");

        let tso = self.runtime.partitions()[partition].tso.clone();
        let response = match timeout(self.rpc_timeout, tso.commit(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(TsoError::Disconnected)) | Err(_) => {
                return self.resolve_unknown_outcome(txn);
            }
            Ok(Err(error)) => return Err(error.into()),
        };

        if !response.committed {
            debug!(start_ts, "commit rejected");
            self.policy.lock().force_global = true;
            self.cleanup(&txn.parts[0])?;
            txn.status = TxnStatus::Aborted;
            return Err(TxnError::CommitRejected { start_ts });
        }

        txn.parts[0].commit_ts = response.commit_ts;
        if response.elder {
            self.reincarnate(&txn.parts[0], &response.conflict_rows)?;
            tso.complete_reincarnation(start_ts);
        }
        self.write_shadows(&txn.parts[0]);
        txn.status = TxnStatus::Committed;
        debug!(
            start_ts,
            commit_ts = response.commit_ts,
            elder = response.elder,
            "commit done"
        );
        Ok(())
    }

    async fn commit_global(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        let TxnKind::Global { sequence } = txn.kind else {
            unreachable!("commit_global on a local transaction");
        };
        let vts: Vec<Timestamp> = txn.parts.iter().map(|part| part.start_ts).collect();
        trace!(sequence, "trying global commit");

        // Phase 1: prepare on every partition, enqueueing everywhere before
        // waiting anywhere.
        let pending = txn
            .parts
            .iter()
            .map(|part| {
                let request = PrepareCommit {
                    start_ts: part.start_ts,
                    writes: part.write_fingerprints(),
                    reads: part.read_fingerprints(),
                    vts: vts.clone(),
                };
                self.runtime.partitions()[part.partition]
                    .tso
                    .request(TsoRequest::Prepare(request))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(TxnError::from)?;

        let mut success = true;
        for response in pending {
            match response.await {
                Ok(TsoResponse::Prepare(prepare)) => success &= prepare.committed,
                Ok(_) => return Err(TsoError::UnexpectedResponse.into()),
                Err(_) => return Err(TsoError::Disconnected.into()),
            }
        }

        // Phase 2: the commit vector is broadcast by the sequencer; every
        // partition decides the same way.
        let responses = self
            .runtime
            .sequencer()
            .global_commit(MultiCommitRequest {
                vts,
                successful_prepared: success,
            })
            .await?;

        if responses.iter().any(|response| !response.committed) {
            debug!(sequence, "global commit aborted");
            for part in &txn.parts {
                self.cleanup(part)?;
            }
            txn.status = TxnStatus::Aborted;
            return Err(TxnError::CommitRejected {
                start_ts: txn.start_ts(),
            });
        }

        for (part, response) in txn.parts.iter_mut().zip(&responses) {
            part.commit_ts = response.commit_ts;
        }
        for (part, response) in txn.parts.iter().zip(&responses) {
            if response.elder {
                self.reincarnate(part, &response.conflict_rows)?;
                self.runtime.partitions()[part.partition]
                    .tso
                    .complete_reincarnation(part.start_ts);
            }
            self.write_shadows(part);
        }
        txn.status = TxnStatus::Committed;
        debug!(sequence, "global commit done");
        Ok(())
    }

    /// The commit request was sent but no decision came back. The commit
    /// table is the source of truth: an entry means committed; otherwise the
    /// entry is invalidated so a late publish fails, and the transaction
    /// counts as aborted.
    fn resolve_unknown_outcome(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        let start_ts = txn.parts[0].start_ts;
        let partition = txn.parts[0].partition;
        warn!(start_ts, "commit outcome unknown; resolving through the commit table");

        let commit_table = &self.runtime.partitions()[partition].commit_table;
        if let Some(record) = commit_table.get(start_ts)? {
            return self.finish_resolved_commit(txn, record);
        }
        commit_table.invalidate(start_ts)?;
        if let Some(record) = commit_table.get(start_ts)? {
            // The decider published before the invalidation landed.
            return self.finish_resolved_commit(txn, record);
        }

        self.cleanup(&txn.parts[0])?;
        txn.status = TxnStatus::Aborted;
        Err(TxnError::CommitRejected { start_ts })
    }

    /// Completes a commit learned from the commit table rather than the
    /// decider's response. The durable record carries the elder conflict
    /// rows, so this path reincarnates and reports it exactly like the
    /// normal response path would have.
    fn finish_resolved_commit(
        &self,
        txn: &mut Transaction,
        record: CommitRecord,
    ) -> Result<(), TxnError> {
        let start_ts = txn.parts[0].start_ts;
        txn.parts[0].commit_ts = record.commit_ts;
        if record.is_elder() {
            self.reincarnate(&txn.parts[0], &record.conflict_rows)?;
            self.runtime.partitions()[txn.parts[0].partition]
                .tso
                .complete_reincarnation(start_ts);
        }
        self.write_shadows(&txn.parts[0]);
        txn.status = TxnStatus::Committed;
        debug!(
            start_ts,
            commit_ts = record.commit_ts,
            elder = record.is_elder(),
            "commit resolved from the commit table"
        );
        Ok(())
    }

    fn route(&self, txn: &Transaction, row: &[u8]) -> Result<usize, TxnError> {
        match txn.kind {
            TxnKind::Local => {
                let part = &txn.parts[0];
                if self.runtime.partitions()[part.partition].range.contains(row) {
                    Ok(part.partition)
                } else {
                    // The chosen partition cannot carry this transaction;
                    // restart as global next time.
                    self.policy.lock().force_global = true;
                    Err(TxnError::PartitionMismatch {
                        start_ts: part.start_ts,
                    })
                }
            }
            TxnKind::Global { .. } => self
                .runtime
                .covering(row)
                .ok_or(TxnError::NoPartitionForRow),
        }
    }

    fn version_visible(
        &self,
        partition: usize,
        cell: &Cell,
        version: Timestamp,
        snapshot: Timestamp,
    ) -> Result<bool, TxnError> {
        // A snapshot timestamp is unique to its owner, so a version at
        // exactly the snapshot is the transaction's own speculative write.
        if version == snapshot {
            return Ok(true);
        }
        if let Some(commit_ts) = self.store.shadow(cell, version)? {
            return Ok(commit_ts <= snapshot);
        }
        match self.runtime.partitions()[partition].commit_table.get(version)? {
            Some(record) => {
                if let Err(error) = self.store.put_shadow(cell, version, record.commit_ts) {
                    warn!(version, %error, "shadow-cell repair failed");
                }
                Ok(record.commit_ts <= snapshot)
            }
            // Aborted, still in flight, or collected past the watermark.
            None => Ok(false),
        }
    }

    fn write_shadows(&self, part: &PartitionTxn) {
        for write in &part.writes {
            for cell in write.cell_coords() {
                if let Err(error) = self.store.put_shadow(&cell, part.start_ts, part.commit_ts) {
                    warn!(
                        start_ts = part.start_ts,
                        %error,
                        "shadow-cell write failed; readers will repair from the commit table"
                    );
                }
            }
        }
    }

    /// Rewrites the conflicted rows at the commit timestamp so they stay
    /// visible under the commit-order snapshot rule.
    fn reincarnate(
        &self,
        part: &PartitionTxn,
        conflict_rows: &[RowFingerprint],
    ) -> Result<(), TxnError> {
        debug!(
            start_ts = part.start_ts,
            commit_ts = part.commit_ts,
            rows = conflict_rows.len(),
            "reincarnating"
        );
        for write in &part.writes {
            if !conflict_rows.contains(&write.fingerprint()) {
                continue;
            }
            for (qualifier, value) in &write.cells {
                let cell = Cell::new(
                    write.table.clone(),
                    write.row.clone(),
                    write.family.clone(),
                    qualifier.clone(),
                );
                self.store.put(&cell, part.commit_ts, value.clone())?;
                self.store.put_shadow(&cell, part.commit_ts, part.commit_ts)?;
            }
        }
        Ok(())
    }

    fn cleanup(&self, part: &PartitionTxn) -> Result<(), TxnError> {
        for write in &part.writes {
            for cell in write.cell_coords() {
                self.store.delete(&cell, part.start_ts)?;
            }
        }
        self.runtime.partitions()[part.partition]
            .tso
            .complete_abort(part.start_ts);
        Ok(())
    }

    fn ensure_active(txn: &Transaction) -> Result<(), TxnError> {
        match txn.status {
            TxnStatus::Active => Ok(()),
            TxnStatus::Committed => Err(TxnError::AlreadyCommitted),
            TxnStatus::Aborted => Err(TxnError::AlreadyAborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::partition::KeyRange;
    use crate::client::runtime::Partition;
    use crate::storage::{
        InMemoryCommitTable, InMemoryTimestampStorage, MemoryColumnStore, StorageError,
    };
    use crate::tso::{PanickingPanicker, Sequencer, TsoConfig, TsoServer};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Cluster {
        manager: TransactionManager,
        store: Arc<MemoryColumnStore>,
        commit_tables: Vec<Arc<InMemoryCommitTable>>,
    }

    fn cluster_over(
        store: Arc<dyn ColumnStore>,
        ranges: Vec<KeyRange>,
        cache_sets: usize,
        cache_ways: usize,
    ) -> (TransactionManager, Vec<Arc<InMemoryCommitTable>>) {
        let mut handles = Vec::new();
        let mut partitions = Vec::new();
        let mut commit_tables = Vec::new();
        for (index, range) in ranges.into_iter().enumerate() {
            let commit_table = Arc::new(InMemoryCommitTable::new());
            let handle = TsoServer::spawn(
                TsoConfig::default()
                    .with_timestamp_batch(100_000)
                    .with_allocation_threshold(1_000)
                    .with_cache_geometry(cache_sets, cache_ways)
                    .with_partition_index(index),
                Arc::new(InMemoryTimestampStorage::new()),
                Arc::clone(&commit_table) as _,
                Arc::new(PanickingPanicker),
            )
            .unwrap();
            handles.push(handle.clone());
            partitions.push(Partition {
                range,
                tso: handle,
                commit_table: Arc::clone(&commit_table) as _,
            });
            commit_tables.push(commit_table);
        }
        let sequencer = Sequencer::spawn(handles);
        let runtime = Arc::new(TxnRuntime::new(partitions, sequencer));
        (TransactionManager::new(runtime, store), commit_tables)
    }

    fn cluster(ranges: Vec<KeyRange>, cache_sets: usize, cache_ways: usize) -> Cluster {
        let store = Arc::new(MemoryColumnStore::new());
        let (manager, commit_tables) =
            cluster_over(Arc::clone(&store) as _, ranges, cache_sets, cache_ways);
        Cluster {
            manager,
            store,
            commit_tables,
        }
    }

    fn single() -> Cluster {
        cluster(vec![KeyRange::full()], 64, 4)
    }

    fn two_partitions() -> Cluster {
        cluster(
            vec![KeyRange::new("", "m"), KeyRange::unbounded("m")],
            64,
            4,
        )
    }

    fn cell(row: &str) -> Cell {
        Cell::new("t", row, "f", "q")
    }

    fn row_write(row: &str, value: &str) -> RowWrite {
        RowWrite::new("t", row, "f").with_cell("q", value)
    }

    #[tokio::test]
    async fn simple_commit_is_visible_to_later_snapshots() {
        let c = single();
        let mut txn = c.manager.begin().await.unwrap();
        c.manager.put(&mut txn, row_write("row1", "v1")).unwrap();
        c.manager.commit(&mut txn).await.unwrap();

        assert_eq!(txn.status(), TxnStatus::Committed);
        assert!(txn.commit_ts() > txn.start_ts());
        assert_eq!(
            c.commit_tables[0].get(txn.start_ts()).unwrap(),
            Some(CommitRecord::new(txn.commit_ts()))
        );

        let mut reader = c.manager.begin().await.unwrap();
        assert_eq!(
            c.manager.get(&mut reader, &cell("row1")).unwrap(),
            Some(Value::from("v1"))
        );
    }

    #[tokio::test]
    async fn write_write_conflict_aborts_the_second_txn() {
        let c = single();
        let mut t1 = c.manager.begin().await.unwrap();
        let mut t2 = c.manager.begin().await.unwrap();

        c.manager.put(&mut t1, row_write("r", "v1")).unwrap();
        c.manager.commit(&mut t1).await.unwrap();

        c.manager.put(&mut t2, row_write("r", "v2")).unwrap();
        let err = c.manager.commit(&mut t2).await.unwrap_err();
        assert!(matches!(err, TxnError::CommitRejected { .. }));
        assert_eq!(t2.status(), TxnStatus::Aborted);

        // The loser's speculative version is gone; only t1's survives.
        let versions = c.store.versions(&cell("r"), u64::MAX).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].0, t1.start_ts());
    }

    #[tokio::test]
    async fn snapshots_respect_commit_order() {
        let c = single();
        let mut t1 = c.manager.begin().await.unwrap();
        c.manager.put(&mut t1, row_write("r", "v1")).unwrap();

        // t2's snapshot predates t1's commit.
        let mut t2 = c.manager.begin().await.unwrap();
        c.manager.commit(&mut t1).await.unwrap();
        assert!(t1.commit_ts() > t2.start_ts());
        assert_eq!(c.manager.get(&mut t2, &cell("r")).unwrap(), None);

        let mut t3 = c.manager.begin().await.unwrap();
        assert_eq!(
            c.manager.get(&mut t3, &cell("r")).unwrap(),
            Some(Value::from("v1"))
        );
    }

    #[tokio::test]
    async fn read_your_own_writes() {
        let c = single();
        let mut txn = c.manager.begin().await.unwrap();
        assert_eq!(c.manager.get(&mut txn, &cell("r")).unwrap(), None);

        c.manager.put(&mut txn, row_write("r", "mine")).unwrap();
        assert_eq!(
            c.manager.get(&mut txn, &cell("r")).unwrap(),
            Some(Value::from("mine"))
        );
    }

    #[tokio::test]
    async fn abort_removes_speculative_versions() {
        let c = single();
        let mut txn = c.manager.begin().await.unwrap();
        c.manager.put(&mut txn, row_write("r", "v")).unwrap();
        c.manager.abort(&mut txn).unwrap();

        assert_eq!(txn.status(), TxnStatus::Aborted);
        assert!(c.store.versions(&cell("r"), u64::MAX).unwrap().is_empty());

        let mut reader = c.manager.begin().await.unwrap();
        assert_eq!(c.manager.get(&mut reader, &cell("r")).unwrap(), None);
    }

    #[tokio::test]
    async fn empty_txn_commits_at_its_snapshot() {
        let c = single();
        let mut txn = c.manager.begin().await.unwrap();
        c.manager.commit(&mut txn).await.unwrap();

        assert_eq!(txn.commit_ts(), txn.start_ts());
        assert_eq!(c.commit_tables[0].get(txn.start_ts()).unwrap(), None);
    }

    #[tokio::test]
    async fn evicted_writer_commits_as_elder_and_reincarnates() {
        // One set, one way: every commit displaces the previous entry and
        // drags the low-watermark forward.
        let c = cluster(vec![KeyRange::full()], 1, 1);

        let mut elder = c.manager.begin().await.unwrap();
        c.manager.put(&mut elder, row_write("rE", "v")).unwrap();

        for i in 0..5 {
            let mut filler = c.manager.begin().await.unwrap();
            c.manager
                .put(&mut filler, row_write(&format!("filler{i}"), "x"))
                .unwrap();
            c.manager.commit(&mut filler).await.unwrap();
        }

        c.manager.commit(&mut elder).await.unwrap();
        assert_eq!(elder.status(), TxnStatus::Committed);
        let commit_ts = elder.commit_ts();
        assert!(commit_ts > elder.start_ts());

        // Reincarnation rewrote the row at the commit timestamp.
        assert_eq!(
            c.store.shadow(&cell("rE"), commit_ts).unwrap(),
            Some(commit_ts)
        );

        let mut reader = c.manager.begin().await.unwrap();
        assert_eq!(
            c.manager.get(&mut reader, &cell("rE")).unwrap(),
            Some(Value::from("v"))
        );
    }

    /// Delegating store that silently loses shadow-cell writes while the
    /// flag is up.
    struct ShadowDroppingStore {
        inner: Arc<MemoryColumnStore>,
        dropping: AtomicBool,
    }

    impl ColumnStore for ShadowDroppingStore {
        fn put(&self, cell: &Cell, version: Timestamp, value: Value) -> Result<(), StorageError> {
            self.inner.put(cell, version, value)
        }
        fn put_shadow(
            &self,
            cell: &Cell,
            version: Timestamp,
            commit_ts: Timestamp,
        ) -> Result<(), StorageError> {
            if self.dropping.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.inner.put_shadow(cell, version, commit_ts)
        }
        fn shadow(
            &self,
            cell: &Cell,
            version: Timestamp,
        ) -> Result<Option<Timestamp>, StorageError> {
            self.inner.shadow(cell, version)
        }
        fn versions(
            &self,
            cell: &Cell,
            max_version: Timestamp,
        ) -> Result<Vec<(Timestamp, Value)>, StorageError> {
            self.inner.versions(cell, max_version)
        }
        fn delete(&self, cell: &Cell, version: Timestamp) -> Result<(), StorageError> {
            self.inner.delete(cell, version)
        }
        fn scan(
            &self,
            table: &[u8],
            family: &[u8],
            start_row: &[u8],
            end_row: &[u8],
            max_version: Timestamp,
        ) -> Result<Vec<(Cell, Vec<(Timestamp, Value)>)>, StorageError> {
            self.inner.scan(table, family, start_row, end_row, max_version)
        }
    }

    #[tokio::test]
    async fn lost_shadow_cells_are_repaired_from_the_commit_table() {
        let inner = Arc::new(MemoryColumnStore::new());
        let store = Arc::new(ShadowDroppingStore {
            inner: Arc::clone(&inner),
            dropping: AtomicBool::new(true),
        });
        let (manager, _tables) =
            cluster_over(Arc::clone(&store) as _, vec![KeyRange::full()], 64, 4);

        let mut txn = manager.begin().await.unwrap();
        manager.put(&mut txn, row_write("r", "v")).unwrap();
        manager.commit(&mut txn).await.unwrap();

        // Commit succeeded but the shadow cell never landed.
        assert_eq!(inner.shadow(&cell("r"), txn.start_ts()).unwrap(), None);

        store.dropping.store(false, Ordering::SeqCst);
        let mut reader = manager.begin().await.unwrap();
        assert_eq!(
            manager.get(&mut reader, &cell("r")).unwrap(),
            Some(Value::from("v"))
        );

        // The read repaired the shadow cell in place.
        assert_eq!(
            inner.shadow(&cell("r"), txn.start_ts()).unwrap(),
            Some(txn.commit_ts())
        );
    }

    #[tokio::test]
    async fn failed_local_commit_makes_the_next_txn_global() {
        let c = single();
        let mut t1 = c.manager.begin().await.unwrap();
        let mut t2 = c.manager.begin().await.unwrap();

        c.manager.put(&mut t1, row_write("r", "v1")).unwrap();
        c.manager.commit(&mut t1).await.unwrap();
        c.manager.put(&mut t2, row_write("r", "v2")).unwrap();
        assert!(c.manager.commit(&mut t2).await.is_err());

        let t3 = c.manager.begin().await.unwrap();
        assert!(t3.is_global());

        // The flag is one-shot.
        let t4 = c.manager.begin().await.unwrap();
        assert!(!t4.is_global());
    }

    #[tokio::test]
    async fn out_of_partition_put_fails_and_forces_global() {
        let c = two_partitions();
        let mut txn = c.manager.begin().await.unwrap();

        let err = c.manager.put(&mut txn, row_write("z", "v")).unwrap_err();
        assert!(matches!(err, TxnError::PartitionMismatch { .. }));

        let next = c.manager.begin().await.unwrap();
        assert!(next.is_global());
    }

    #[tokio::test]
    async fn global_commit_spans_partitions() {
        let c = two_partitions();
        let mut txn = c.manager.begin_global().await.unwrap();
        c.manager.put(&mut txn, row_write("a", "left")).unwrap();
        c.manager.put(&mut txn, row_write("z", "right")).unwrap();
        c.manager.commit(&mut txn).await.unwrap();

        assert_eq!(txn.status(), TxnStatus::Committed);
        let starts = txn.start_timestamps();
        let commits = txn.commit_timestamps();
        for partition in 0..2 {
            assert_eq!(
                c.commit_tables[partition].get(starts[partition]).unwrap(),
                Some(CommitRecord::new(commits[partition]))
            );
        }

        let mut reader = c.manager.begin_global().await.unwrap();
        assert_eq!(
            c.manager.get(&mut reader, &cell("a")).unwrap(),
            Some(Value::from("left"))
        );
        assert_eq!(
            c.manager.get(&mut reader, &cell("z")).unwrap(),
            Some(Value::from("right"))
        );
    }

    #[tokio::test]
    async fn global_commit_aborts_everywhere_when_one_partition_conflicts() {
        let c = two_partitions();

        // g2's snapshot predates g1's commit of "z", so g2's prepare on the
        // second partition reports the conflict.
        let mut g2 = c.manager.begin_global().await.unwrap();
        let mut g1 = c.manager.begin_global().await.unwrap();
        c.manager.put(&mut g1, row_write("z", "v1")).unwrap();
        c.manager.commit(&mut g1).await.unwrap();

        c.manager.put(&mut g2, row_write("a", "v2")).unwrap();
        c.manager.put(&mut g2, row_write("z", "v3")).unwrap();
        let err = c.manager.commit(&mut g2).await.unwrap_err();
        assert!(matches!(err, TxnError::CommitRejected { .. }));
        assert_eq!(g2.status(), TxnStatus::Aborted);

        // No partition installed anything for g2 and its speculative
        // versions are gone.
        for (partition, start_ts) in g2.start_timestamps().into_iter().enumerate() {
            assert_eq!(c.commit_tables[partition].get(start_ts).unwrap(), None);
        }
        assert!(c.store.versions(&cell("a"), u64::MAX).unwrap().is_empty());

        let mut reader = c.manager.begin_global().await.unwrap();
        assert_eq!(
            c.manager.get(&mut reader, &cell("z")).unwrap(),
            Some(Value::from("v1"))
        );
    }

    #[tokio::test]
    async fn scan_returns_committed_rows_in_order() {
        let c = single();
        for (row, value) in [("a", "va"), ("b", "vb")] {
            let mut txn = c.manager.begin().await.unwrap();
            c.manager.put(&mut txn, row_write(row, value)).unwrap();
            c.manager.commit(&mut txn).await.unwrap();
        }
        // An uncommitted writer must stay invisible.
        let mut pending = c.manager.begin().await.unwrap();
        c.manager.put(&mut pending, row_write("c", "vc")).unwrap();

        let mut reader = c.manager.begin().await.unwrap();
        let hits = c.manager.scan(&mut reader, b"t", b"f", b"a", b"zz").unwrap();
        let rows: Vec<_> = hits
            .iter()
            .map(|(cell, _)| String::from_utf8_lossy(&cell.row).into_owned())
            .collect();
        assert_eq!(rows, vec!["a", "b"]);
        assert_eq!(reader.read_count(), 3);
    }

    #[tokio::test]
    async fn global_scan_fans_out_across_partitions() {
        let c = two_partitions();
        let mut writer = c.manager.begin_global().await.unwrap();
        c.manager.put(&mut writer, row_write("a", "left")).unwrap();
        c.manager.put(&mut writer, row_write("z", "right")).unwrap();
        c.manager.commit(&mut writer).await.unwrap();

        let mut reader = c.manager.begin_global().await.unwrap();
        let hits = c.manager.scan(&mut reader, b"t", b"f", b"a", b"zz").unwrap();
        let rows: Vec<_> = hits.iter().map(|(cell, _)| cell.row.clone()).collect();
        assert_eq!(rows, vec![b"a".to_vec(), b"z".to_vec()]);
    }

    #[tokio::test]
    async fn unknown_commit_outcome_resolves_consistently() {
        let store = Arc::new(MemoryColumnStore::new());
        let (manager, _tables) =
            cluster_over(Arc::clone(&store) as _, vec![KeyRange::full()], 64, 4);
        let manager = manager.with_rpc_timeout(Duration::ZERO);

        let mut txn = manager.begin().await.unwrap();
        manager.put(&mut txn, row_write("r", "v")).unwrap();

        // The zero timeout forces the unknown-outcome path; the decision
        // races the resolution and either side may win, but the resolved
        // state must be consistent.
        match manager.commit(&mut txn).await {
            Ok(()) => {
                assert_eq!(txn.status(), TxnStatus::Committed);
                let mut reader = manager.begin().await.unwrap();
                assert_eq!(
                    manager.get(&mut reader, &cell("r")).unwrap(),
                    Some(Value::from("v"))
                );
            }
            Err(TxnError::CommitRejected { .. }) => {
                assert_eq!(txn.status(), TxnStatus::Aborted);
                let mut reader = manager.begin().await.unwrap();
                assert_eq!(manager.get(&mut reader, &cell("r")).unwrap(), None);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn finished_transactions_reject_further_operations() {
        let c = single();
        let mut txn = c.manager.begin().await.unwrap();
        c.manager.commit(&mut txn).await.unwrap();

        assert!(matches!(
            c.manager.put(&mut txn, row_write("r", "v")),
            Err(TxnError::AlreadyCommitted)
        ));
        assert!(matches!(
            c.manager.commit(&mut txn).await,
            Err(TxnError::AlreadyCommitted)
        ));

        let mut aborted = c.manager.begin().await.unwrap();
        c.manager.abort(&mut aborted).unwrap();
        assert!(matches!(
            c.manager.get(&mut aborted, &cell("r")),
            Err(TxnError::AlreadyAborted)
        ));
    }
}
