// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Logical wire messages between clients and a status oracle.
//!
//! Rows travel as 64-bit fingerprints; full row bytes never reach the
//! oracle. Network framing is the transport's concern.

use serde::{Deserialize, Serialize};

use super::decider::CommitResult;
use super::timestamp::{RowFingerprint, Timestamp, NO_TIMESTAMP};

/// Requests a new start timestamp. `sequence` correlates the timestamp
/// requests of one global transaction across partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampRequest {
    pub client_id: u64,
    pub sequence: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampResponse {
    pub timestamp: Timestamp,
}

/// Asks the decider to commit a single-partition transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub start_ts: Timestamp,
    pub writes: Vec<RowFingerprint>,
    pub reads: Vec<RowFingerprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub committed: bool,
    pub commit_ts: Timestamp,
    pub elder: bool,
    pub conflict_rows: Vec<RowFingerprint>,
}

impl From<CommitResult> for CommitResponse {
    fn from(result: CommitResult) -> Self {
        match result {
            CommitResult::Committed {
                commit_ts,
                elder,
                conflict_rows,
            } => Self {
                committed: true,
                commit_ts,
                elder,
                conflict_rows,
            },
            CommitResult::Aborted { .. } => Self {
                committed: false,
                commit_ts: NO_TIMESTAMP,
                elder: false,
                conflict_rows: Vec::new(),
            },
        }
    }
}

/// First phase of a global commit: one partition's writes and reads plus the
/// transaction's full timestamp vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareCommit {
    pub start_ts: Timestamp,
    pub writes: Vec<RowFingerprint>,
    pub reads: Vec<RowFingerprint>,
    pub vts: Vec<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub committed: bool,
}

/// Second phase of a global commit, broadcast by the sequencer to every
/// partition. `successful_prepared` is the conjunction of all prepare votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiCommitRequest {
    pub vts: Vec<Timestamp>,
    pub successful_prepared: bool,
}

/// Reports that an aborted transaction's speculative versions are gone.
/// Idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAbort {
    pub start_ts: Timestamp,
}

/// Reports that an elder's rows were rewritten at its commit timestamp.
/// Idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReincarnation {
    pub start_ts: Timestamp,
}

/// Every request a status-oracle partition accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TsoRequest {
    Timestamp(TimestampRequest),
    Commit(CommitRequest),
    Prepare(PrepareCommit),
    MultiCommit(MultiCommitRequest),
    CompleteAbort(CompleteAbort),
    CompleteReincarnation(CompleteReincarnation),
}

/// Every response a status-oracle partition produces. The bookkeeping
/// requests have no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TsoResponse {
    Timestamp(TimestampResponse),
    Commit(CommitResponse),
    Prepare(PrepareResponse),
}
