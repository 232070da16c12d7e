// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Commit decisions against the conflict cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::{CommitRecord, CommitTable};

use super::cache::CommitCache;
use super::oracle::BatchTimestampOracle;
use super::timestamp::{RowFingerprint, Timestamp, NO_TIMESTAMP};

/// Why a commit request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A read or written row has a committed writer newer than the
    /// transaction's snapshot.
    Conflict { fingerprint: RowFingerprint },
    /// The snapshot predates the low-watermark and a read row was missing
    /// from the cache, so absence of conflict cannot be proven.
    TooOld,
    /// The commit-table publish failed; no shared state was changed.
    Durability,
    /// The transaction's prepare phase failed locally or on a peer
    /// partition.
    PrepareFailed,
}

/// Outcome of a commit decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Committed {
        commit_ts: Timestamp,
        /// The transaction committed although some of its written rows had
        /// been evicted from the cache before admission; the client must
        /// rewrite those rows at `commit_ts` (reincarnation) to keep them
        /// visible under the commit-order snapshot rule.
        elder: bool,
        /// The written rows an elder must reincarnate.
        conflict_rows: Vec<RowFingerprint>,
    },
    Aborted {
        reason: AbortReason,
    },
}

struct Admission {
    elder: bool,
    conflict_rows: Vec<RowFingerprint>,
}

struct PreparedCommit {
    commit_ts: Timestamp,
    writes: Vec<RowFingerprint>,
    elder: bool,
    conflict_rows: Vec<RowFingerprint>,
}

/// The single serialization point of a TSO partition.
///
/// Exactly one thread drives a decider. Timestamp handout order, commit-ts
/// allocation order and commit-table publish order all coincide because they
/// happen here, which is what linearizes commits by commit timestamp.
///
/// Either the commit-table publish succeeds and the cache is updated, or
/// nothing in shared state changes and the transaction is aborted; the cache
/// is only mutated after a successful publish.
pub struct CommitDecider {
    oracle: BatchTimestampOracle,
    cache: CommitCache,
    commit_table: Arc<dyn CommitTable>,
    low_watermark: Timestamp,
    prepared: HashMap<Timestamp, PreparedCommit>,
    awaiting_cleanup: HashSet<Timestamp>,
    awaiting_reincarnation: HashSet<Timestamp>,
}

impl CommitDecider {
    /// Creates a decider over its oracle, cache and commit table.
    pub fn new(
        oracle: BatchTimestampOracle,
        cache: CommitCache,
        commit_table: Arc<dyn CommitTable>,
    ) -> Self {
        Self {
            oracle,
            cache,
            commit_table,
            low_watermark: NO_TIMESTAMP,
            prepared: HashMap::new(),
            awaiting_cleanup: HashSet::new(),
            awaiting_reincarnation: HashSet::new(),
        }
    }

    /// Hands out a start timestamp.
    pub fn timestamp(&mut self) -> Timestamp {
        self.oracle.next()
    }

    /// Decides a single-partition commit.
    pub fn commit(
        &mut self,
        start_ts: Timestamp,
        writes: &[RowFingerprint],
        reads: &[RowFingerprint],
    ) -> CommitResult {
        let admission = match self.admit(start_ts, writes, reads) {
            Ok(admission) => admission,
            Err(reason) => return self.abort(start_ts, reason),
        };

        if writes.is_empty() {
            // Read-only: the snapshot is the commit point, nothing to
            // publish or install.
            debug!(start_ts, "read-only commit");
            return CommitResult::Committed {
                commit_ts: start_ts,
                elder: false,
                conflict_rows: Vec::new(),
            };
        }

        let commit_ts = self.oracle.next();
        let record = CommitRecord {
            commit_ts,
            conflict_rows: admission.conflict_rows.clone(),
        };
        if let Err(error) = self.commit_table.put(start_ts, record) {
            warn!(start_ts, %error, "commit-table publish failed");
            return self.abort(start_ts, AbortReason::Durability);
        }
        self.install(&admission, start_ts, commit_ts, writes)
    }

    /// Runs the first phase of a global commit: admission plus commit-ts
    /// allocation, holding the decision back until the commit vector
    /// arrives. Returns whether this partition votes to commit.
    pub fn prepare(
        &mut self,
        start_ts: Timestamp,
        writes: Vec<RowFingerprint>,
        reads: &[RowFingerprint],
    ) -> bool {
        match self.admit(start_ts, &writes, reads) {
            Ok(Admission {
                elder,
                conflict_rows,
            }) => {
                let commit_ts = self.oracle.next();
                debug!(start_ts, commit_ts, "prepared");
                self.prepared.insert(
                    start_ts,
                    PreparedCommit {
                        commit_ts,
                        writes,
                        elder,
                        conflict_rows,
                    },
                );
                true
            }
            Err(reason) => {
                self.abort(start_ts, reason);
                false
            }
        }
    }

    /// Completes a global commit for this partition once the sequencer has
    /// broadcast the commit vector. `successful_prepared` is the conjunction
    /// of every partition's prepare vote.
    pub fn multi_commit(&mut self, start_ts: Timestamp, successful_prepared: bool) -> CommitResult {
        let Some(prepared) = self.prepared.remove(&start_ts) else {
            // Our own prepare already aborted (and was recorded then), or the
            // start timestamp is unknown.
            return CommitResult::Aborted {
                reason: AbortReason::PrepareFailed,
            };
        };

        if !successful_prepared {
            return self.abort(start_ts, AbortReason::PrepareFailed);
        }

        if prepared.writes.is_empty() {
            debug!(start_ts, "read-only partition of a global commit");
            return CommitResult::Committed {
                commit_ts: start_ts,
                elder: false,
                conflict_rows: Vec::new(),
            };
        }

        let record = CommitRecord {
            commit_ts: prepared.commit_ts,
            conflict_rows: prepared.conflict_rows.clone(),
        };
        if let Err(error) = self.commit_table.put(start_ts, record) {
            warn!(start_ts, %error, "commit-table publish failed");
            return self.abort(start_ts, AbortReason::Durability);
        }
        let admission = Admission {
            elder: prepared.elder,
            conflict_rows: prepared.conflict_rows,
        };
        self.install(&admission, start_ts, prepared.commit_ts, &prepared.writes)
    }

    /// Retires abort bookkeeping once the client has deleted its speculative
    /// versions. Idempotent.
    pub fn complete_abort(&mut self, start_ts: Timestamp) {
        self.awaiting_cleanup.remove(&start_ts);
    }

    /// Retires elder bookkeeping once the client has rewritten its rows at
    /// the commit timestamp. Idempotent.
    pub fn complete_reincarnation(&mut self, start_ts: Timestamp) {
        self.awaiting_reincarnation.remove(&start_ts);
    }

    /// The largest commit timestamp ever evicted from the cache.
    pub fn low_watermark(&self) -> Timestamp {
        self.low_watermark
    }

    /// Aborted transactions whose cleanup has not been reported yet.
    pub fn cleanup_backlog(&self) -> usize {
        self.awaiting_cleanup.len()
    }

    /// Elders whose reincarnation has not been reported yet.
    pub fn reincarnation_backlog(&self) -> usize {
        self.awaiting_reincarnation.len()
    }

    fn admit(
        &self,
        start_ts: Timestamp,
        writes: &[RowFingerprint],
        reads: &[RowFingerprint],
    ) -> Result<Admission, AbortReason> {
        for &fingerprint in reads {
            let seen = self.cache.get(fingerprint);
            if seen > start_ts {
                return Err(AbortReason::Conflict { fingerprint });
            }
            if seen == NO_TIMESTAMP && self.low_watermark > start_ts {
                return Err(AbortReason::TooOld);
            }
        }

        let mut elder = false;
        let mut conflict_rows = Vec::new();
        for &fingerprint in writes {
            let seen = self.cache.get(fingerprint);
            if seen > start_ts {
                return Err(AbortReason::Conflict { fingerprint });
            }
            // A missed written row under an advanced watermark cannot be
            // proven conflict-free; the transaction is admitted as an elder
            // and must rewrite the row at its commit timestamp.
            if seen == NO_TIMESTAMP && self.low_watermark > start_ts {
                elder = true;
                if !conflict_rows.contains(&fingerprint) {
                    conflict_rows.push(fingerprint);
                }
            }
        }
        Ok(Admission {
            elder,
            conflict_rows,
        })
    }

    fn install(
        &mut self,
        admission: &Admission,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        writes: &[RowFingerprint],
    ) -> CommitResult {
        for &fingerprint in writes {
            let evicted = self.cache.set(fingerprint, commit_ts);
            if evicted > self.low_watermark {
                self.low_watermark = evicted;
                if let Err(error) = self.commit_table.checkpoint_low_watermark(self.low_watermark) {
                    warn!(%error, "low-watermark checkpoint failed");
                }
            }
        }
        if admission.elder {
            self.awaiting_reincarnation.insert(start_ts);
        }
        debug!(start_ts, commit_ts, elder = admission.elder, "committed");
        CommitResult::Committed {
            commit_ts,
            elder: admission.elder,
            conflict_rows: admission.conflict_rows.clone(),
        }
    }

    fn abort(&mut self, start_ts: Timestamp, reason: AbortReason) -> CommitResult {
        debug!(start_ts, ?reason, "aborted");
        self.awaiting_cleanup.insert(start_ts);
        CommitResult::Aborted { reason }
    }
}
