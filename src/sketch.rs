//! Concurrent Count-Min sketch - the approximate per-flow volume estimator.
//!
//! A fixed R x C grid of atomic counters shared by every worker thread. Each
//! insert adds the packet length to one cell per row (chosen by an
//! independently-seeded hash), each query takes the minimum across rows. The
//! estimate never undercounts a flow's true accumulated bytes; hash collisions
//! with unrelated flows can only inflate it.
//!
//! All cell updates are single-word `fetch_add` with relaxed ordering. No cell
//! is ever decremented or cleared while the process runs, so readers tolerate
//! arbitrary interleaving with writers: a concurrent query may miss in-flight
//! additions but can never observe a torn value.

use std::sync::atomic::{AtomicU64, Ordering};

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::descriptor::{FlowKey, FLOW_KEY_MAX_BYTES};
use crate::error::ConfigError;

/// Default number of hash rows.
pub const DEFAULT_ROWS: usize = 8;
/// Default columns per row.
pub const DEFAULT_COLS: usize = 65536;

/// Per-row seed offset. The odd golden-gamma constant keeps the row seeds far
/// apart so the R hash functions behave as if independent.
const ROW_SEED_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Computes the column index for `key` in the given row.
///
/// Deterministic and O(1); this runs R times per packet and dominates the
/// per-packet cost.
#[inline]
pub fn column_index(key: &FlowKey, row: usize, cols: usize) -> usize {
    let mut buf = [0u8; FLOW_KEY_MAX_BYTES];
    let len = key.canonical_bytes(&mut buf);
    let seed = ROW_SEED_GAMMA.wrapping_mul(row as u64 + 1);
    (xxh3_64_with_seed(&buf[..len], seed) % cols as u64) as usize
}

/// The shared sketch. Allocated once at startup, never resized or cleared.
#[derive(Debug)]
pub struct CountMinSketch {
    rows: usize,
    cols: usize,
    cells: Box<[AtomicU64]>,
}

impl CountMinSketch {
    /// Allocates a zeroed sketch. Rejects degenerate dimensions up front;
    /// after construction every operation is total.
    pub fn new(rows: usize, cols: usize) -> Result<Self, ConfigError> {
        if rows == 0 || cols == 0 {
            return Err(ConfigError::InvalidSketchDimensions { rows, cols });
        }
        let cells = (0..rows * cols).map(|_| AtomicU64::new(0)).collect();
        Ok(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn cell(&self, row: usize, col: usize) -> &AtomicU64 {
        &self.cells[row * self.cols + col]
    }

    /// Adds `amount` to the key's cell in every row. Infallible; safe to call
    /// from any number of threads concurrently.
    #[inline]
    pub fn insert(&self, key: &FlowKey, amount: u64) {
        for row in 0..self.rows {
            let col = column_index(key, row, self.cols);
            self.cell(row, col).fetch_add(amount, Ordering::Relaxed);
        }
    }

    /// Returns the Count-Min estimate for the key: the minimum cell value
    /// across rows. Always >= the true accumulated amount for this key.
    #[inline]
    pub fn query(&self, key: &FlowKey) -> u64 {
        let mut min = u64::MAX;
        for row in 0..self.rows {
            let col = column_index(key, row, self.cols);
            let val = self.cell(row, col).load(Ordering::Relaxed);
            if val < min {
                min = val;
            }
        }
        min
    }

    /// The column indices a key maps to, one per row. Used by tests to
    /// construct collision-free key pairs.
    #[cfg(test)]
    pub fn columns_for(&self, key: &FlowKey) -> Vec<usize> {
        (0..self.rows)
            .map(|row| column_index(key, row, self.cols))
            .collect()
    }
}
