// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction handles and per-partition state.

use std::collections::HashSet;

use crate::tso::{RowFingerprint, Timestamp, NO_TIMESTAMP};

use super::row::RowWrite;

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// One partition's share of a transaction: its snapshot there, the staged
/// row writes and the read fingerprints to validate at commit.
#[derive(Debug)]
pub(crate) struct PartitionTxn {
    pub(crate) partition: usize,
    pub(crate) start_ts: Timestamp,
    pub(crate) commit_ts: Timestamp,
    pub(crate) writes: Vec<RowWrite>,
    pub(crate) reads: HashSet<RowFingerprint>,
}

impl PartitionTxn {
    fn new(partition: usize, start_ts: Timestamp) -> Self {
        Self {
            partition,
            start_ts,
            commit_ts: NO_TIMESTAMP,
            writes: Vec::new(),
            reads: HashSet::new(),
        }
    }

    pub(crate) fn write_fingerprints(&self) -> Vec<RowFingerprint> {
        self.writes.iter().map(RowWrite::fingerprint).collect()
    }

    pub(crate) fn read_fingerprints(&self) -> Vec<RowFingerprint> {
        self.reads.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TxnKind {
    Local,
    Global { sequence: u64 },
}

/// A transaction handle.
///
/// Owned and mutated by a single caller; the manager drives it through
/// begin → operate → commit/abort. A local transaction holds one partition
/// state; a global one holds a state per partition with the sequencer-ordered
/// timestamp vector spread across them.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) kind: TxnKind,
    pub(crate) parts: Vec<PartitionTxn>,
    pub(crate) status: TxnStatus,
}

impl Transaction {
    pub(crate) fn local(partition: usize, start_ts: Timestamp) -> Self {
        Self {
            kind: TxnKind::Local,
            parts: vec![PartitionTxn::new(partition, start_ts)],
            status: TxnStatus::Active,
        }
    }

    pub(crate) fn global(sequence: u64, vts: Vec<Timestamp>) -> Self {
        Self {
            kind: TxnKind::Global { sequence },
            parts: vts
                .into_iter()
                .enumerate()
                .map(|(partition, start_ts)| PartitionTxn::new(partition, start_ts))
                .collect(),
            status: TxnStatus::Active,
        }
    }

    pub(crate) fn part_mut(&mut self, partition: usize) -> &mut PartitionTxn {
        match self.kind {
            TxnKind::Local => &mut self.parts[0],
            TxnKind::Global { .. } => &mut self.parts[partition],
        }
    }

    /// Returns the current status.
    #[inline]
    pub fn status(&self) -> TxnStatus {
        self.status
    }

    /// Returns true for a sequencer-ordered multi-partition transaction.
    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self.kind, TxnKind::Global { .. })
    }

    /// The start timestamp; for a global transaction, the earliest entry of
    /// its timestamp vector.
    pub fn start_ts(&self) -> Timestamp {
        self.parts
            .iter()
            .map(|part| part.start_ts)
            .min()
            .unwrap_or(NO_TIMESTAMP)
    }

    /// The commit timestamp, [`NO_TIMESTAMP`] until decided; for a global
    /// transaction, the latest entry of its commit vector.
    pub fn commit_ts(&self) -> Timestamp {
        self.parts
            .iter()
            .map(|part| part.commit_ts)
            .max()
            .unwrap_or(NO_TIMESTAMP)
    }

    /// Per-partition start timestamps in partition order; a single entry for
    /// a local transaction.
    pub fn start_timestamps(&self) -> Vec<Timestamp> {
        self.parts.iter().map(|part| part.start_ts).collect()
    }

    /// Per-partition commit timestamps in partition order, [`NO_TIMESTAMP`]
    /// where undecided.
    pub fn commit_timestamps(&self) -> Vec<Timestamp> {
        self.parts.iter().map(|part| part.commit_ts).collect()
    }

    /// Number of staged row writes across all partitions.
    pub fn write_count(&self) -> usize {
        self.parts.iter().map(|part| part.writes.len()).sum()
    }

    /// Number of distinct rows read across all partitions.
    pub fn read_count(&self) -> usize {
        self.parts.iter().map(|part| part.reads.len()).sum()
    }
}
