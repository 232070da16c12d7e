// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Fixed-memory conflict-detection cache.

use super::timestamp::{RowFingerprint, Timestamp, NO_TIMESTAMP};

/// Set-associative map from row fingerprint to the latest commit timestamp
/// that wrote the row.
///
/// The backing array is a flat vector of `2 * (sets + ways)` words, each slot
/// a `(fingerprint, commit_ts)` pair, so a way group is contiguous and can be
/// scanned past the nominal set count without modular wrap.
///
/// Eviction picks the way with the smallest stored commit timestamp: commit
/// timestamps are monotonically increasing, so the smallest value is the
/// least recently updated slot without spending a separate clock per way.
/// The displaced commit timestamp is returned from [`CommitCache::set`]; its
/// running maximum is the decider's low-watermark.
///
/// Accessed only from the decider thread; unsynchronized by design.
pub struct CommitCache {
    slots: Vec<u64>,
    sets: usize,
    ways: usize,
}

impl CommitCache {
    /// Creates a cache with `sets` sets of `ways` ways each.
    pub fn new(sets: usize, ways: usize) -> Self {
        assert!(sets > 0, "cache must have at least one set");
        assert!(ways > 0, "cache must have at least one way");
        Self {
            slots: vec![0; 2 * (sets + ways)],
            sets,
            ways,
        }
    }

    #[inline]
    fn set_index(&self, fingerprint: RowFingerprint) -> usize {
        (fingerprint % self.sets as u64) as usize
    }

    /// Returns the commit timestamp recorded for `fingerprint`, or
    /// [`NO_TIMESTAMP`] if absent.
    pub fn get(&self, fingerprint: RowFingerprint) -> Timestamp {
        let index = self.set_index(fingerprint);
        for way in 0..self.ways {
            let slot = 2 * (index + way);
            if self.slots[slot] == fingerprint {
                return self.slots[slot + 1];
            }
        }
        NO_TIMESTAMP
    }

    /// Records `commit_ts` for `fingerprint` and returns the commit timestamp
    /// displaced to make room, or [`NO_TIMESTAMP`] when the fingerprint was
    /// already present or an empty way was taken.
    pub fn set(&mut self, fingerprint: RowFingerprint, commit_ts: Timestamp) -> Timestamp {
        let index = self.set_index(fingerprint);
        let mut victim_slot = 0;
        let mut victim_value = u64::MAX;
        for way in 0..self.ways {
            let slot = 2 * (index + way);
            if self.slots[slot] == fingerprint {
                victim_value = NO_TIMESTAMP;
                victim_slot = slot;
                break;
            }
            if self.slots[slot + 1] <= victim_value {
                victim_value = self.slots[slot + 1];
                victim_slot = slot;
            }
        }
        self.slots[victim_slot] = fingerprint;
        self.slots[victim_slot + 1] = commit_ts;
        victim_value
    }
}
