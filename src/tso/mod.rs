// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The Transaction Status Oracle: timestamps and commit decisions.
//!
//! A TSO partition is a single serialization point. One dedicated thread
//! drains a queue of requests and, per commit request, validates the
//! transaction's read and write fingerprints against a fixed-memory
//! set-associative cache, allocates a commit timestamp, publishes the
//! decision to the commit table and installs the writes back into the cache.
//! Because handout, allocation and publish all happen on that one thread,
//! commits are linearized by commit timestamp.
//!
//! # Key Concepts
//!
//! ## Low-watermark
//!
//! The cache is fixed-size, so entries get evicted. The largest commit
//! timestamp ever evicted is the *low-watermark*: for a fingerprint the cache
//! no longer knows, any conflicting commit must have happened at or below it.
//! A transaction whose snapshot predates the watermark cannot be validated
//! against missing read rows and aborts as too old.
//!
//! ## Elders
//!
//! A transaction whose *written* row was evicted before admission is still
//! committed, but flagged an elder: the client rewrites those rows at the
//! commit timestamp ("reincarnation") so later snapshots resolve them under
//! the commit-order rule.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use osmiumdb::storage::{InMemoryCommitTable, InMemoryTimestampStorage};
//! use osmiumdb::tso::{ProcessAbortPanicker, TsoConfig, TsoServer};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = TsoServer::spawn(
//!     TsoConfig::default(),
//!     Arc::new(InMemoryTimestampStorage::new()),
//!     Arc::new(InMemoryCommitTable::new()),
//!     Arc::new(ProcessAbortPanicker),
//! )?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod decider;
mod messages;
mod oracle;
mod panicker;
mod sequencer;
mod server;
mod timestamp;

pub use cache::CommitCache;
pub use config::TsoConfig;
pub use decider::{AbortReason, CommitDecider, CommitResult};
pub use messages::{
    CommitRequest, CommitResponse, CompleteAbort, CompleteReincarnation, MultiCommitRequest,
    PrepareCommit, PrepareResponse, TimestampRequest, TimestampResponse, TsoRequest, TsoResponse,
};
pub use oracle::BatchTimestampOracle;
pub use panicker::{Panicker, PanickingPanicker, ProcessAbortPanicker};
pub use sequencer::{Sequencer, SequencerHandle};
pub use server::{TsoError, TsoHandle, TsoServer};
pub use timestamp::{RowFingerprint, Timestamp, NO_TIMESTAMP};
