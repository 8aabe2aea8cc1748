//! Sample-rate conversion to the configured analysis rate.
//!
//! Devices capture at their native rate (often 44.1 or 48 kHz) and WAV files
//! carry whatever rate they were recorded at, while the spectral transform
//! expects one fixed rate. `RateConverter` bridges that on the producer
//! thread with a rubato `FastFixedIn` resampler.
//!
//! Equal rates select a passthrough mode and no rubato session is created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{Result, TaggerError};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input not yet handed to rubato (less than one block).
    pending: Vec<f32>,
    block: usize,
    out_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `block` is the rubato input frame count per call.
    ///
    /// # Errors
    /// `TaggerError::AudioStream` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, block: usize) -> Result<Self> {
        let block = block.max(1);
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block,
                out_buf: Vec::new(),
            });
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, block, 1)
            .map_err(|e| TaggerError::AudioStream(format!("resampler init: {e}")))?;
        let out_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        debug!(from_rate, to_rate, block, "resampler created");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(block * 2),
            block,
            out_buf,
        })
    }

    /// Feed samples; returns whatever output is ready (possibly empty).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.block {
            let block = &self.pending[consumed..consumed + self.block];
            match resampler.process_into_buffer(&[block], &mut self.out_buf, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.out_buf[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            consumed += self.block;
        }
        self.pending.drain(..consumed);
        out
    }

    /// Push out the buffered remainder by zero-padding it to a full block.
    /// Used at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.pending.is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        let padding = self.block - self.pending.len();
        self.process(&vec![0.0; padding])
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
