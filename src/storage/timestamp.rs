// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Durable storage for the oracle's maximum allocated timestamp.

use crate::tso::Timestamp;

use super::error::StorageError;

/// Durable storage for a single monotonically-advancing counter: the largest
/// timestamp the oracle has ever promised to hand out.
///
/// The oracle persists a new ceiling *before* handing out timestamps under
/// it, so after a crash the stored value bounds everything that may have been
/// issued and restart cannot reuse a timestamp.
pub trait TimestampStorage: Send + Sync {
    /// Reads the current durable ceiling. Zero if never written.
    fn read(&self) -> Result<Timestamp, StorageError>;

    /// Advances the durable ceiling from `prev` to `next`.
    ///
    /// Fails with [`StorageError::WatermarkMismatch`] when the stored value
    /// is not `prev`, which means another oracle instance has taken over the
    /// counter and this one must not issue any further timestamps.
    fn compare_and_update(&self, prev: Timestamp, next: Timestamp) -> Result<(), StorageError>;
}
