// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Timestamp and fingerprint scalars.

/// A logical timestamp issued by a status oracle.
///
/// Timestamps are strictly increasing within an oracle epoch and never repeat
/// across restarts. They double as version numbers in the column store and as
/// the values held by the commit cache, so they stay raw 64-bit words rather
/// than a newtype.
pub type Timestamp = u64;

/// Sentinel meaning "never" / "not yet decided".
///
/// Used for an undecided commit timestamp, an absent cache entry, and the
/// initial low-watermark.
pub const NO_TIMESTAMP: Timestamp = 0;

/// A 64-bit fingerprint of (table, row, family).
///
/// Fingerprints are deliberately narrow: the wire protocol and the commit
/// cache only ever see these, never row bytes. Collisions cause spurious
/// aborts only.
pub type RowFingerprint = u64;
