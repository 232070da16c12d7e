// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The explicit runtime a transaction manager operates in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::storage::CommitTable;
use crate::tso::{Sequencer, SequencerHandle, TsoHandle};

use super::partition::KeyRange;

/// One status-oracle partition as the client sees it: the row range it
/// serves, its request handle and its commit table.
pub struct Partition {
    pub range: KeyRange,
    pub tso: TsoHandle,
    pub commit_table: Arc<dyn CommitTable>,
}

/// Everything a [`TransactionManager`](super::TransactionManager) needs to
/// operate: the partition map, the sequencer handle and the global-sequence
/// generator. An explicit value, constructed from configuration and passed
/// in, so nothing about the deployment hides in process-wide state.
pub struct TxnRuntime {
    partitions: Vec<Partition>,
    sequencer: SequencerHandle,
    sequence: AtomicU64,
    client_id: u64,
}

impl TxnRuntime {
    /// Builds a runtime over the given partitions (sorted by range lower
    /// bound) and sequencer.
    pub fn new(mut partitions: Vec<Partition>, sequencer: SequencerHandle) -> Self {
        assert!(!partitions.is_empty(), "a runtime needs at least one partition");
        partitions.sort_by(|a, b| a.range.lower().cmp(b.range.lower()));
        Self {
            partitions,
            sequencer,
            sequence: AtomicU64::new(0),
            client_id: std::process::id() as u64,
        }
    }

    /// Convenience constructor for a single-partition deployment: the
    /// partition covers every row and the sequencer is spawned internally.
    pub fn single_partition(tso: TsoHandle, commit_table: Arc<dyn CommitTable>) -> Self {
        let sequencer = Sequencer::spawn(vec![tso.clone()]);
        Self::new(
            vec![Partition {
                range: KeyRange::full(),
                tso,
                commit_table,
            }],
            sequencer,
        )
    }

    /// The partitions in partition-index order.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// The sequencer handle.
    pub fn sequencer(&self) -> &SequencerHandle {
        &self.sequencer
    }

    /// Index of the partition covering `row`, if any.
    pub fn covering(&self, row: &[u8]) -> Option<usize> {
        self.partitions
            .iter()
            .position(|partition| partition.range.contains(row))
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn client_id(&self) -> u64 {
        self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryCommitTable, InMemoryTimestampStorage};
    use crate::tso::{PanickingPanicker, TsoConfig, TsoServer};

    fn handle() -> TsoHandle {
        TsoServer::spawn(
            TsoConfig::default()
                .with_timestamp_batch(10_000)
                .with_allocation_threshold(100),
            Arc::new(InMemoryTimestampStorage::new()),
            Arc::new(InMemoryCommitTable::new()),
            Arc::new(PanickingPanicker),
        )
        .unwrap()
    }

    #[test]
    fn covering_routes_rows_by_range() {
        let tso = handle();
        let commit_table: Arc<dyn crate::storage::CommitTable> =
            Arc::new(InMemoryCommitTable::new());
        let sequencer = Sequencer::spawn(vec![tso.clone(), tso.clone()]);

        let runtime = TxnRuntime::new(
            vec![
                Partition {
                    range: KeyRange::unbounded("m"),
                    tso: tso.clone(),
                    commit_table: Arc::clone(&commit_table),
                },
                Partition {
                    range: KeyRange::new("", "m"),
                    tso,
                    commit_table,
                },
            ],
            sequencer,
        );

        // Sorted by lower bound regardless of construction order.
        assert_eq!(runtime.covering(b"a"), Some(0));
        assert_eq!(runtime.covering(b"z"), Some(1));
    }

    #[test]
    fn sequence_numbers_are_unique() {
        let tso = handle();
        let runtime =
            TxnRuntime::single_partition(tso, Arc::new(InMemoryCommitTable::new()));
        let a = runtime.next_sequence();
        let b = runtime.next_sequence();
        assert_ne!(a, b);
    }
}
