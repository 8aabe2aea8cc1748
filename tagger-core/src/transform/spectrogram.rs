//! Log-frequency magnitude spectrogram, one column per chunk.
//!
//! Pipeline per chunk:
//! 1. Peak-normalize the samples to [-1, 1].
//! 2. Hann window + real FFT over `frame_size` samples (zero-padded or
//!    truncated as needed).
//! 3. Triangular filters centred on `bands` logarithmically spaced
//!    frequencies between `min_frequency_hz` and `max_frequency_hz`, each
//!    normalized to unit area.
//! 4. `log10(1 + energy)` per band.
//!
//! A digitally silent chunk cannot be normalized and yields a NaN column.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use super::FeatureExtractor;
use crate::{
    buffering::chunk::AudioChunk,
    error::{Result, TaggerError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramConfig {
    pub sample_rate: u32,
    /// FFT frame length in samples.
    pub frame_size: usize,
    pub bands: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32_000,
            frame_size: 1024,
            bands: 128,
            min_frequency_hz: 20.0,
            max_frequency_hz: 14_000.0,
        }
    }
}

pub struct LogSpectrogram {
    sample_rate: u32,
    frame_size: usize,
    window: Vec<f32>,
    /// `filters[band]` = (first FFT bin, weights).
    filters: Vec<(usize, Vec<f32>)>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
}

impl LogSpectrogram {
    /// # Errors
    /// `InvalidConfig` for a zero-sized frame or band count, or a frequency
    /// range that is empty or above Nyquist.
    pub fn new(config: &SpectrogramConfig) -> Result<Self> {
        if config.frame_size < 2 || config.bands == 0 {
            return Err(TaggerError::InvalidConfig(
                "spectrogram needs frame_size >= 2 and at least one band".into(),
            ));
        }
        let nyquist = config.sample_rate as f32 / 2.0;
        if !(config.min_frequency_hz > 0.0
            && config.min_frequency_hz < config.max_frequency_hz
            && config.max_frequency_hz <= nyquist)
        {
            return Err(TaggerError::InvalidConfig(format!(
                "frequency range {}..{} Hz must be non-empty and within 0..{} Hz",
                config.min_frequency_hz, config.max_frequency_hz, nyquist
            )));
        }

        let filters = build_log_filters(
            config.frame_size,
            config.sample_rate,
            config.bands,
            config.min_frequency_hz,
            config.max_frequency_hz,
        );
        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.frame_size);
        debug!(
            frame_size = config.frame_size,
            bands = config.bands,
            "log spectrogram ready"
        );

        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            window: build_hann_window(config.frame_size),
            filters,
            fft,
            fft_buf: vec![Complex::new(0.0, 0.0); config.frame_size],
        })
    }
}

impl FeatureExtractor for LogSpectrogram {
    fn bands(&self) -> usize {
        self.filters.len()
    }

    fn transform_frame(&mut self, chunk: &AudioChunk) -> Result<Vec<f32>> {
        if chunk.is_empty() {
            return Err(TaggerError::Transform("empty chunk".into()));
        }
        if chunk.sample_rate != self.sample_rate {
            return Err(TaggerError::Transform(format!(
                "chunk rate {} Hz, spectrogram expects {} Hz",
                chunk.sample_rate, self.sample_rate
            )));
        }

        let peak = chunk.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak == 0.0 {
            return Ok(vec![f32::NAN; self.bands()]);
        }

        for (i, slot) in self.fft_buf.iter_mut().enumerate() {
            let s = chunk.samples.get(i).copied().unwrap_or(0.0) / peak;
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        let magnitudes: Vec<f32> = self.fft_buf[..self.frame_size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect();

        Ok(self
            .filters
            .iter()
            .map(|(start, weights)| {
                let energy: f32 = weights
                    .iter()
                    .zip(&magnitudes[*start..])
                    .map(|(w, m)| w * m)
                    .sum();
                (1.0 + energy).log10()
            })
            .collect())
    }
}

fn build_hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Unit-area triangular filters on a geometric frequency grid.
///
/// Bands too narrow to cover any FFT bin collapse onto their nearest bin.
fn build_log_filters(
    fft_size: usize,
    sr: u32,
    bands: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<(usize, Vec<f32>)> {
    let n_freqs = fft_size / 2 + 1;
    let bin_hz = sr as f32 / fft_size as f32;
    let ratio = (fmax / fmin).powf(1.0 / (bands + 1) as f32);
    let edges: Vec<f32> = (0..bands + 2)
        .map(|i| fmin * ratio.powi(i as i32) / bin_hz)
        .collect();

    (0..bands)
        .map(|b| {
            let (lower, center, upper) = (edges[b], edges[b + 1], edges[b + 2]);
            let first = lower.ceil() as usize;
            let last = (upper.floor() as usize).min(n_freqs - 1);
            let mut weights: Vec<f32> = (first..=last)
                .map(|k| {
                    let k = k as f32;
                    if k <= center {
                        (k - lower) / (center - lower).max(1e-6)
                    } else {
                        (upper - k) / (upper - center).max(1e-6)
                    }
                    .max(0.0)
                })
                .collect();

            let area: f32 = weights.iter().sum();
            if first > last || area <= 0.0 {
                let nearest = (center.round() as usize).min(n_freqs - 1);
                return (nearest, vec![1.0]);
            }
            weights.iter_mut().for_each(|w| *w /= area);
            (first, weights)
        })
        .collect()
}
