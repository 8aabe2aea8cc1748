//! Per-consumer sliding window of feature columns.
//!
//! The window is a dense `bands × width` matrix ordered oldest (column 0) to
//! newest (column `width - 1`). The only mutation is shift-left-by-one plus
//! append on the right, so the width never changes.

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TaggerError};

#[derive(Debug, Clone)]
pub struct SlidingWindowCache {
    window: Array2<f32>,
    /// Clock value (`written`) already folded into the window.
    last_processed: Option<u64>,
}

impl SlidingWindowCache {
    /// Zero-filled window.
    pub fn new(bands: usize, width: usize) -> Self {
        Self {
            window: Array2::zeros((bands, width)),
            last_processed: None,
        }
    }

    pub fn bands(&self) -> usize {
        self.window.nrows()
    }

    pub fn width(&self) -> usize {
        self.window.ncols()
    }

    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }

    pub fn mark_processed(&mut self, written: u64) {
        self.last_processed = Some(written);
    }

    /// Drop the oldest column and append `column` as the newest.
    ///
    /// Non-finite values (silent frames normalise to NaN) are stored as zero.
    /// O(bands × width).
    pub fn push_column(&mut self, column: &[f32]) -> Result<()> {
        let bands = self.bands();
        if column.len() != bands {
            return Err(TaggerError::FeatureShape {
                expected: bands,
                actual: column.len(),
            });
        }
        let width = self.width();
        if width == 0 {
            return Ok(());
        }
        for (mut row, &value) in self.window.rows_mut().into_iter().zip(column) {
            for col in 1..width {
                row[col - 1] = row[col];
            }
            row[width - 1] = if value.is_finite() { value } else { 0.0 };
        }
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.window.view()
    }

    /// Owned copy for publishing.
    pub fn snapshot(&self) -> Array2<f32> {
        self.window.clone()
    }

    /// Zero-fill and forget what was processed.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.last_processed = None;
    }
}
