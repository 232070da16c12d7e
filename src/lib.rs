// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! OsmiumDB: snapshot-isolation transactions over a multi-versioned
//! wide-column store.
//!
//! A centralized Transaction Status Oracle hands out strictly monotonic
//! timestamps and decides commits by checking write/read fingerprints
//! against a fixed-memory conflict cache. Clients write optimistically at
//! their start timestamp and annotate committed versions with shadow cells;
//! the store itself never learns about transactions.

pub mod client;
pub mod storage;
pub mod tso;

pub use client::{
    fingerprint, KeyRange, Partition, RowWrite, Transaction, TransactionManager, TxnError,
    TxnRuntime, TxnStatus,
};
pub use storage::{
    Cell, ColumnStore, CommitRecord, CommitTable, InMemoryCommitTable, InMemoryTimestampStorage,
    MemoryColumnStore, RocksCommitTable, RocksTimestampStorage, StorageError, TimestampStorage,
    Value,
};
pub use tso::{
    BatchTimestampOracle, CommitCache, CommitDecider, Panicker, ProcessAbortPanicker,
    RowFingerprint, Sequencer, SequencerHandle, Timestamp, TsoConfig, TsoError, TsoHandle,
    TsoServer, NO_TIMESTAMP,
};
