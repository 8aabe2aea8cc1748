//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O, so it only downmixes to mono and pushes
//! into the SPSC capture ring; everything else happens on the producer thread.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms. `AudioCapture` is therefore
//! created and dropped on the producer thread, inside the source factory.

pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::CaptureProducer,
    error::{Result, TaggerError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active input stream.
///
/// **Not `Send`**: keep it on the thread that opened it.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise the default input
    /// device, otherwise the first available one.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: CaptureProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();

        let preferred = preferred_device_name.and_then(|wanted| {
            let found = host.input_devices().ok().and_then(|mut devices| {
                devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            });
            if found.is_none() {
                warn!("preferred input device '{}' not found, falling back", wanted);
            }
            found
        });

        let device = match preferred.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| TaggerError::AudioDevice(e.to_string()))?;
                let fallback = devices.next().ok_or(TaggerError::NoDefaultInputDevice)?;
                warn!("no default input device, falling back to first available input");
                fallback
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| TaggerError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let callback_running = Arc::clone(&running);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_mono_stream::<f32>(&device, &config, producer, callback_running)
            }
            SampleFormat::I16 => {
                build_mono_stream::<i16>(&device, &config, producer, callback_running)
            }
            SampleFormat::U8 => {
                build_mono_stream::<u8>(&device, &config, producer, callback_running)
            }
            fmt => Err(TaggerError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| TaggerError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: CaptureProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(TaggerError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: CaptureProducer,
    running: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    use crate::buffering::Producer;
    use cpal::Sample;

    let channels = config.channels as usize;
    let mut mix_buf: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                downmix_into(data, channels, &mut mix_buf, |s| s.to_sample::<f32>());
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!(
                        "capture ring full: dropped {} frames",
                        mix_buf.len() - written
                    );
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| TaggerError::AudioStream(e.to_string()))
}

/// Average interleaved frames down to mono f32, reusing `out`.
pub fn downmix_into<T: Copy>(
    data: &[T],
    channels: usize,
    out: &mut Vec<f32>,
    to_f32: impl Fn(T) -> f32,
) {
    let ch = channels.max(1);
    let frames = data.len() / ch;
    out.resize(frames, 0.0);
    for (frame, slot) in data.chunks_exact(ch).zip(out.iter_mut()) {
        *slot = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / ch as f32;
    }
}
