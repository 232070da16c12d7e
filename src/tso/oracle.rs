// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Batched timestamp oracle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::storage::{StorageError, TimestampStorage};

use super::panicker::Panicker;
use super::timestamp::Timestamp;

/// Produces a strictly increasing sequence of 64-bit timestamps, persisting
/// ceiling advances in batches so the hot path is a local increment.
///
/// Three scalars drive it: `last` (handed out), `max` (current ceiling) and
/// the published `max_allocated` (latest ceiling made durable by the
/// background allocator). A new ceiling is always durable before anything
/// under it is handed out, so a restarted oracle resumes from the stored
/// value and can never reuse a timestamp.
///
/// `next` is intended for exactly one caller thread (the commit decider);
/// the allocator thread is the sole writer of `max_allocated`.
pub struct BatchTimestampOracle {
    last: Timestamp,
    max: Timestamp,
    next_allocation_threshold: Timestamp,
    allocation_threshold: u64,
    max_allocated: Arc<AtomicU64>,
    allocate: Sender<()>,
}

impl BatchTimestampOracle {
    /// Creates the oracle and triggers the first batch allocation.
    ///
    /// `batch` must exceed `allocation_threshold`, otherwise a window could
    /// close before its successor allocation is even requested.
    pub fn new(
        batch: u64,
        allocation_threshold: u64,
        storage: Arc<dyn TimestampStorage>,
        panicker: Arc<dyn Panicker>,
    ) -> Result<Self, StorageError> {
        assert!(
            batch > allocation_threshold,
            "timestamp batch ({batch}) must exceed the allocation threshold ({allocation_threshold})"
        );

        let initial = storage.read()?;
        let max_allocated = Arc::new(AtomicU64::new(initial));
        let (allocate, trigger) = unbounded();

        spawn_allocator(batch, initial, storage, panicker, Arc::clone(&max_allocated), trigger);

        info!(last_timestamp = initial, "initializing timestamp oracle");
        let oracle = Self {
            last: initial,
            max: initial,
            next_allocation_threshold: 0,
            allocation_threshold,
            max_allocated,
            allocate,
        };
        oracle
            .allocate
            .send(())
            .expect("timestamp allocator exited during startup");
        Ok(oracle)
    }

    /// Returns the next timestamp.
    ///
    /// Spins when the pre-allocated range is exhausted until the allocator
    /// publishes a new ceiling; a stuck allocator is fatal and the spin has
    /// no timeout.
    pub fn next(&mut self) -> Timestamp {
        self.last += 1;

        if self.last == self.next_allocation_threshold {
            let _ = self.allocate.send(());
        }

        if self.last >= self.max {
            assert!(self.max <= self.max_allocated.load(Ordering::Acquire));
            while self.max_allocated.load(Ordering::Acquire) == self.max {
                std::hint::spin_loop();
            }
            self.max = self.max_allocated.load(Ordering::Acquire);
            self.next_allocation_threshold = self.max - self.allocation_threshold;
            assert!(self.next_allocation_threshold > self.last);
            assert!(self.next_allocation_threshold < self.max);
            assert!(self.last < self.max);
        }

        self.last
    }

    /// Read-only snapshot of the last timestamp handed out.
    pub fn last(&self) -> Timestamp {
        self.last
    }
}

impl std::fmt::Display for BatchTimestampOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimestampOracle {{ last: {}, max: {} }}", self.last, self.max)
    }
}

fn spawn_allocator(
    batch: u64,
    initial: Timestamp,
    storage: Arc<dyn TimestampStorage>,
    panicker: Arc<dyn Panicker>,
    max_allocated: Arc<AtomicU64>,
    trigger: Receiver<()>,
) {
    thread::Builder::new()
        .name("ts-persist".into())
        .spawn(move || {
            let mut previous = initial;
            // Exits when the oracle is dropped and the channel disconnects.
            for () in trigger.iter() {
                let next = previous + batch;
                match storage.compare_and_update(previous, next) {
                    Ok(()) => {
                        debug!(previous, next, "advanced durable timestamp ceiling");
                        max_allocated.store(next, Ordering::Release);
                        previous = next;
                    }
                    Err(error) => {
                        panicker.panic("cannot persist the new timestamp ceiling", &error)
                    }
                }
            }
        })
        .expect("failed to spawn ts-persist thread");
}
