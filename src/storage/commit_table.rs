// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Commit table trait definition.

use crate::tso::{RowFingerprint, Timestamp};

use super::error::StorageError;

/// A published commit decision.
///
/// Besides the commit timestamp, the record carries the conflicted rows of
/// an elder commit. A client that loses the decider's response learns the
/// outcome from this record alone, so everything it must act on — including
/// the rows to rewrite at the commit timestamp — has to be durable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub commit_ts: Timestamp,
    /// Rows an elder must rewrite at `commit_ts`; empty for ordinary
    /// commits.
    pub conflict_rows: Vec<RowFingerprint>,
}

impl CommitRecord {
    /// An ordinary (non-elder) commit record.
    pub fn new(commit_ts: Timestamp) -> Self {
        Self {
            commit_ts,
            conflict_rows: Vec::new(),
        }
    }

    /// True when the transaction was admitted as an elder and its conflicted
    /// rows must be rewritten at `commit_ts`.
    pub fn is_elder(&self) -> bool {
        !self.conflict_rows.is_empty()
    }
}

/// Durable append-only map from start timestamp to its commit record, with
/// an invalidation marker.
///
/// The decider publishes the record here before making a commit visible;
/// readers that find a cell without a shadow cell fall back to this table to
/// resolve visibility. A client that lost the commit response may
/// `invalidate` its entry: from then on the transaction counts as aborted and
/// a late publish from the decider fails.
///
/// Absence of an entry for `start_ts < low_watermark_checkpoint()` means the
/// transaction aborted or its entry was already garbage-collected.
pub trait CommitTable: Send + Sync {
    /// Publishes a commit decision.
    ///
    /// Fails with [`StorageError::EntryInvalidated`] when the entry was
    /// invalidated first; the decider treats that as a durability failure and
    /// aborts the transaction.
    fn put(&self, start_ts: Timestamp, record: CommitRecord) -> Result<(), StorageError>;

    /// Looks up the commit record for a start timestamp.
    ///
    /// Returns `None` for unknown and invalidated entries alike.
    fn get(&self, start_ts: Timestamp) -> Result<Option<CommitRecord>, StorageError>;

    /// Marks a transaction aborted so shadow-cell repair can discard its
    /// speculative versions. Idempotent; wins against a later `put` but
    /// never displaces an already-published commit.
    fn invalidate(&self, start_ts: Timestamp) -> Result<(), StorageError>;

    /// Persists the decider's conflict-cache low-watermark for the store's
    /// garbage collector.
    fn checkpoint_low_watermark(&self, low_watermark: Timestamp) -> Result<(), StorageError>;

    /// Reads the last checkpointed low-watermark. Zero if never written.
    fn low_watermark_checkpoint(&self) -> Result<Timestamp, StorageError>;
}
