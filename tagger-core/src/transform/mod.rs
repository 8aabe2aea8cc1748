//! Chunk → feature column transforms.
//!
//! Each consumer owns its own extractor instance; a transform never sees the
//! ring buffer, only one chunk at a time.

pub mod spectrogram;

use std::sync::Arc;

use crate::{buffering::chunk::AudioChunk, error::Result};

pub use spectrogram::{LogSpectrogram, SpectrogramConfig};

/// Turns one audio chunk into one column of the sliding window.
pub trait FeatureExtractor: Send {
    /// Height of every column returned by [`transform_frame`](Self::transform_frame).
    fn bands(&self) -> usize;

    /// Compute the feature column for `chunk`.
    ///
    /// Values may be NaN or infinite (e.g. on digital silence); the sliding
    /// window stores those as zero.
    fn transform_frame(&mut self, chunk: &AudioChunk) -> Result<Vec<f32>>;
}

/// Builds a fresh extractor for each consumer start.
pub type ExtractorFactory = Arc<dyn Fn() -> Result<Box<dyn FeatureExtractor>> + Send + Sync>;

/// Factory producing [`LogSpectrogram`] extractors for `config`.
pub fn log_spectrogram_factory(config: SpectrogramConfig) -> ExtractorFactory {
    Arc::new(move || -> Result<Box<dyn FeatureExtractor>> {
        Ok(Box::new(LogSpectrogram::new(&config)?) as Box<dyn FeatureExtractor>)
    })
}
