// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Storage error types.

use crate::tso::Timestamp;

/// Errors that can occur in the storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("watermark mismatch: expected {expected}, found {found}")]
    WatermarkMismatch { expected: Timestamp, found: Timestamp },

    #[error("commit entry for start timestamp {start_ts} was invalidated")]
    EntryInvalidated { start_ts: Timestamp },

    #[error("storage corruption: {0}")]
    Corruption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}
