//! Fixed-size audio chunks, the unit stored in each ring buffer slot.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Sources always deliver chunks of exactly the configured `chunk_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 32000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Regroups a variable-length sample stream (resampler output, partial
/// device callbacks) into chunks of exactly `chunk_size` samples.
#[derive(Debug)]
pub struct Rechunker {
    pending: Vec<f32>,
    chunk_size: usize,
}

impl Rechunker {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
    }

    /// Take the next complete chunk, if one is buffered.
    pub fn pop(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.chunk_size {
            return None;
        }
        let rest = self.pending.split_off(self.chunk_size);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// Take whatever is left, zero-padded to a full chunk. `None` when empty.
    pub fn flush_padded(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(self.chunk_size, 0.0);
        Some(tail)
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rechunker_emits_exact_sizes() {
        let mut rc = Rechunker::new(4);
        rc.push(&[1.0, 2.0, 3.0]);
        assert!(rc.pop().is_none());
        rc.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(rc.pop(), Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(rc.pop(), Some(vec![5.0, 6.0, 7.0, 8.0]));
        assert!(rc.pop().is_none());
        assert_eq!(rc.buffered(), 1);
    }

    #[test]
    fn flush_pads_trailing_samples() {
        let mut rc = Rechunker::new(4);
        rc.push(&[0.5]);
        assert_eq!(rc.flush_padded(), Some(vec![0.5, 0.0, 0.0, 0.0]));
        assert!(rc.flush_padded().is_none());
    }

    #[test]
    fn chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 16_000], 32_000);
        assert!((chunk.duration_secs() - 0.5).abs() < 1e-9);
        assert!(!chunk.is_empty());
    }
}
