// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction error types.

use crate::storage::StorageError;
use crate::tso::{Timestamp, TsoError};

/// Errors that can occur in client transaction operations.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("transaction {start_ts} was aborted by the status oracle")]
    CommitRejected { start_ts: Timestamp },

    #[error("transaction already committed")]
    AlreadyCommitted,

    #[error("transaction already aborted")]
    AlreadyAborted,

    #[error("row outside the partition of transaction {start_ts}")]
    PartitionMismatch { start_ts: Timestamp },

    #[error("no partition covers the row")]
    NoPartitionForRow,

    #[error("status oracle error: {0}")]
    Tso(#[from] TsoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
