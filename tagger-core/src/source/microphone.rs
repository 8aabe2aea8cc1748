//! Live microphone input.
//!
//! The cpal callback pushes raw mono samples into the SPSC capture ring; the
//! producer thread drains it here, resamples to the analysis rate and cuts
//! fixed-size chunks.

use std::sync::{atomic::AtomicBool, Arc};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{ChunkSource, SourceParams};
use crate::{
    audio::{resample::RateConverter, AudioCapture},
    buffering::{chunk::AudioChunk, chunk::Rechunker, create_capture_ring, CaptureConsumer, Consumer},
    engine::task::CancelToken,
    error::{Result, TaggerError},
};

const DRAIN_POLL: Duration = Duration::from_millis(2);

pub struct MicrophoneSource {
    /// Dropping this stops the device stream.
    _capture: AudioCapture,
    reader: CaptureReader,
}

impl MicrophoneSource {
    /// Open the preferred (or default) input device.
    ///
    /// Must run on the thread that will call `read_chunk`.
    pub fn open(params: &SourceParams) -> Result<Self> {
        let (producer, consumer) = create_capture_ring();
        let running = Arc::new(AtomicBool::new(true));
        let capture = AudioCapture::open_with_preference(
            producer,
            running,
            params.preferred_input_device.as_deref(),
        )?;
        info!(
            device_rate = capture.sample_rate,
            target_rate = params.sample_rate,
            "microphone source opened"
        );
        let reader = CaptureReader::new(consumer, capture.sample_rate, params)?;
        Ok(Self {
            _capture: capture,
            reader,
        })
    }
}

impl ChunkSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.reader.sample_rate
    }

    fn read_chunk(&mut self, cancel: &CancelToken) -> Result<Option<AudioChunk>> {
        self.reader.read_chunk(cancel)
    }
}

/// Drains the capture ring into fixed-size chunks at the analysis rate.
pub(crate) struct CaptureReader {
    consumer: CaptureConsumer,
    converter: RateConverter,
    rechunker: Rechunker,
    scratch: Vec<f32>,
    sample_rate: u32,
    read_timeout: Duration,
}

impl CaptureReader {
    pub(crate) fn new(
        consumer: CaptureConsumer,
        device_rate: u32,
        params: &SourceParams,
    ) -> Result<Self> {
        Ok(Self {
            consumer,
            converter: RateConverter::new(device_rate, params.sample_rate, 1024)?,
            rechunker: Rechunker::new(params.chunk_size),
            scratch: vec![0.0; 4096],
            sample_rate: params.sample_rate,
            read_timeout: params.read_timeout,
        })
    }

    pub(crate) fn read_chunk(&mut self, cancel: &CancelToken) -> Result<Option<AudioChunk>> {
        let mut last_data = Instant::now();
        loop {
            if let Some(samples) = self.rechunker.pop() {
                return Ok(Some(AudioChunk::new(samples, self.sample_rate)));
            }

            let n = self.consumer.pop_slice(&mut self.scratch);
            if n > 0 {
                let converted = self.converter.process(&self.scratch[..n]);
                self.rechunker.push(&converted);
                last_data = Instant::now();
                continue;
            }

            if last_data.elapsed() >= self.read_timeout {
                let timeout_ms = self.read_timeout.as_millis() as u64;
                warn!(timeout_ms, "microphone delivered no samples");
                return Err(TaggerError::CaptureStalled { timeout_ms });
            }
            if cancel.wait(DRAIN_POLL) {
                return Ok(None);
            }
        }
    }
}
