// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Row writes and fingerprinting.

use twox_hash::xxh3::hash64;

use crate::storage::{Cell, Value};
use crate::tso::RowFingerprint;

/// Computes the 64-bit fingerprint of (table, row, family).
///
/// Components are length-prefixed so distinct triples never concatenate to
/// the same byte string. The status oracle only ever sees this value.
pub fn fingerprint(table: &[u8], row: &[u8], family: &[u8]) -> RowFingerprint {
    let mut buf = Vec::with_capacity(table.len() + row.len() + family.len() + 12);
    for part in [table, row, family] {
        buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
        buf.extend_from_slice(part);
    }
    hash64(&buf)
}

/// One row's staged writes: every (qualifier, value) a transaction wrote
/// under a single (table, row, family).
///
/// Kept in full on the client so the in-store versions can be reconstructed
/// at the start timestamp and, on reincarnation, at the commit timestamp.
#[derive(Debug, Clone)]
pub struct RowWrite {
    pub table: Vec<u8>,
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub cells: Vec<(Vec<u8>, Value)>,
}

impl RowWrite {
    /// Creates an empty row write.
    pub fn new(
        table: impl Into<Vec<u8>>,
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
            family: family.into(),
            cells: Vec::new(),
        }
    }

    /// Adds one (qualifier, value) pair.
    pub fn with_cell(mut self, qualifier: impl Into<Vec<u8>>, value: impl Into<Value>) -> Self {
        self.cells.push((qualifier.into(), value.into()));
        self
    }

    /// The row's conflict-detection fingerprint.
    pub fn fingerprint(&self) -> RowFingerprint {
        fingerprint(&self.table, &self.row, &self.family)
    }

    /// The store coordinates of every staged cell.
    pub(crate) fn cell_coords(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().map(|(qualifier, _)| {
            Cell::new(
                self.table.clone(),
                self.row.clone(),
                self.family.clone(),
                qualifier.clone(),
            )
        })
    }
}
