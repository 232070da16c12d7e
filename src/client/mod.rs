// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Client-side transaction layer.
//!
//! This module turns the status-oracle primitives into a per-transaction
//! lifecycle: begin → operate → commit/abort → cleanup or reincarnation. The
//! column store never learns about transactions; the manager instruments
//! every read and write instead.
//!
//! # Key Concepts
//!
//! ## Speculative writes and shadow cells
//!
//! A `put` lands in the store immediately, versioned at the transaction's
//! start timestamp, with no shadow cell: undecided. Commit writes the shadow
//! cells carrying the commit timestamp. Readers resolve undecided versions
//! through the commit table and repair missing shadow cells as they go, so a
//! client that crashed between decision and annotation costs later readers
//! one lookup, not correctness.
//!
//! ## Partition policy
//!
//! A local transaction lives entirely inside one partition's key range,
//! preferring the partition this client uses most. When a transaction's rows
//! don't fit its partition, or a local commit fails, the next `begin`
//! upgrades to a global transaction: a sequencer-ordered timestamp vector and
//! a two-phase commit across every partition.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use osmiumdb::client::{RowWrite, TransactionManager, TxnRuntime};
//! use osmiumdb::storage::{
//!     Cell, InMemoryCommitTable, InMemoryTimestampStorage, MemoryColumnStore,
//! };
//! use osmiumdb::tso::{ProcessAbortPanicker, TsoConfig, TsoServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let commit_table = Arc::new(InMemoryCommitTable::new());
//! let tso = TsoServer::spawn(
//!     TsoConfig::default(),
//!     Arc::new(InMemoryTimestampStorage::new()),
//!     Arc::clone(&commit_table) as _,
//!     Arc::new(ProcessAbortPanicker),
//! )?;
//! let runtime = Arc::new(TxnRuntime::single_partition(tso, commit_table));
//! let manager = TransactionManager::new(runtime, Arc::new(MemoryColumnStore::new()));
//!
//! let mut txn = manager.begin().await?;
//! manager.put(&mut txn, RowWrite::new("t", "row1", "f").with_cell("q", "v1"))?;
//! let value = manager.get(&mut txn, &Cell::new("t", "row1", "f", "q"))?;
//! manager.commit(&mut txn).await?;
//! println!("committed at {}", txn.commit_ts());
//! # Ok(())
//! # }
//! ```

mod error;
mod manager;
mod partition;
mod row;
mod runtime;
mod transaction;

pub use error::TxnError;
pub use manager::TransactionManager;
pub use partition::KeyRange;
pub use row::{fingerprint, RowWrite};
pub use runtime::{Partition, TxnRuntime};
pub use transaction::{Transaction, TxnStatus};
