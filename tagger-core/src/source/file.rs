//! WAV file playback.
//!
//! The whole file is decoded up front (mono, analysis rate) and then handed
//! out one chunk at a time. With pacing enabled each chunk is released on a
//! fixed real-time schedule, so the pipeline behaves as it would on a live
//! input of the same length.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{ChunkSource, SourceParams};
use crate::{
    audio::{downmix_into, resample::RateConverter},
    buffering::chunk::AudioChunk,
    engine::task::CancelToken,
    error::{Result, TaggerError},
};

pub struct FileSource {
    path: PathBuf,
    samples: Vec<f32>,
    cursor: usize,
    chunk_size: usize,
    sample_rate: u32,
    /// `Some` when playback is paced to real time.
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl FileSource {
    /// Decode `path` and prepare paced (or unpaced) playback.
    ///
    /// # Errors
    /// `SourceUnavailable` if the file is missing, `AudioFile` if it cannot be
    /// decoded.
    pub fn open(path: &Path, params: &SourceParams) -> Result<Self> {
        if !path.is_file() {
            return Err(TaggerError::SourceUnavailable {
                path: path.to_path_buf(),
            });
        }
        let (mono, file_rate) = read_wav_mono_f32(path)?;

        let samples = if file_rate == params.sample_rate {
            mono
        } else {
            let mut converter = RateConverter::new(file_rate, params.sample_rate, 1024)?;
            let mut out = converter.process(&mono);
            out.extend(converter.flush());
            out
        };

        info!(
            path = %path.display(),
            file_rate,
            samples = samples.len(),
            paced = params.pace_playback,
            "file source opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            samples,
            cursor: 0,
            chunk_size: params.chunk_size.max(1),
            sample_rate: params.sample_rate,
            interval: params.pace_playback.then(|| params.chunk_interval()),
            next_due: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chunks not yet delivered, counting a padded tail.
    pub fn remaining_chunks(&self) -> usize {
        (self.samples.len() - self.cursor).div_ceil(self.chunk_size)
    }
}

impl ChunkSource for FileSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self, cancel: &CancelToken) -> Result<Option<AudioChunk>> {
        if self.cursor >= self.samples.len() {
            debug!(path = %self.path.display(), "file source exhausted");
            return Ok(None);
        }

        if let Some(interval) = self.interval {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now && cancel.wait(due - now) {
                return Ok(None);
            }
            self.next_due = Some(due + interval);
        }

        let end = (self.cursor + self.chunk_size).min(self.samples.len());
        let mut chunk = self.samples[self.cursor..end].to_vec();
        chunk.resize(self.chunk_size, 0.0);
        self.cursor = end;
        Ok(Some(AudioChunk::new(chunk, self.sample_rate)))
    }
}

/// Decode any PCM or float WAV into mono f32 at its native rate.
fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let decode_err = |e: hound::Error| TaggerError::AudioFile(format!("{}: {e}", path.display()));

    let mut reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample.max(2) - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_err)?
        }
    };

    let mut mono = Vec::new();
    downmix_into(&interleaved, channels, &mut mono, |s| s);
    Ok((mono, spec.sample_rate))
}
