// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Fatal-error capability.

use tracing::error;

/// How the oracle machinery dies when correctness can no longer be
/// guaranteed.
///
/// A failed watermark persist or a broken monotonicity invariant must stop
/// the whole process, not just the thread that noticed: a decider that keeps
/// answering after its oracle lost durability would hand out reused
/// timestamps.
pub trait Panicker: Send + Sync {
    /// Reports the fatal condition and never returns.
    fn panic(&self, msg: &str, cause: &dyn std::fmt::Display) -> !;
}

/// Production panicker: logs and aborts the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessAbortPanicker;

impl Panicker for ProcessAbortPanicker {
    fn panic(&self, msg: &str, cause: &dyn std::fmt::Display) -> ! {
        error!(%cause, "{msg}");
        std::process::abort();
    }
}

/// Test panicker: unwinds the calling thread instead of killing the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingPanicker;

impl Panicker for PanickingPanicker {
    fn panic(&self, msg: &str, cause: &dyn std::fmt::Display) -> ! {
        panic!("{msg}: {cause}");
    }
}
