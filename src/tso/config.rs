// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for a status-oracle partition.

/// Configuration for one TSO partition.
#[derive(Debug, Clone)]
pub struct TsoConfig {
    /// How far each durable watermark advance moves the ceiling. Persistence
    /// cost is amortized over this many timestamps.
    pub timestamp_batch: u64,
    /// Remaining headroom that triggers the next background allocation.
    /// Must be smaller than `timestamp_batch`.
    pub allocation_threshold: u64,
    /// Number of sets in the conflict cache.
    pub cache_sets: usize,
    /// Number of ways per conflict-cache set.
    pub cache_ways: usize,
    /// This partition's index in the deployment's partition order. Global
    /// commit vectors are indexed by it.
    pub partition_index: usize,
}

impl Default for TsoConfig {
    fn default() -> Self {
        Self {
            timestamp_batch: 10_000_000,
            allocation_threshold: 1_000_000,
            cache_sets: 1 << 20,
            cache_ways: 32,
            partition_index: 0,
        }
    }
}

impl TsoConfig {
    /// Sets the durable batch size.
    pub fn with_timestamp_batch(mut self, batch: u64) -> Self {
        self.timestamp_batch = batch;
        self
    }

    /// Sets the allocation trigger headroom.
    pub fn with_allocation_threshold(mut self, threshold: u64) -> Self {
        self.allocation_threshold = threshold;
        self
    }

    /// Sets the conflict-cache geometry.
    pub fn with_cache_geometry(mut self, sets: usize, ways: usize) -> Self {
        self.cache_sets = sets;
        self.cache_ways = ways;
        self
    }

    /// Sets the partition index.
    pub fn with_partition_index(mut self, index: usize) -> Self {
        self.partition_index = index;
        self
    }
}
