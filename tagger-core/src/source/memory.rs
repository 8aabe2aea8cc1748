//! Scripted in-memory source.
//!
//! Replays a fixed list of chunks, optionally with a start delay and a
//! per-chunk interval. Used by tests and by embedders that already hold
//! decoded audio.

use std::collections::VecDeque;
use std::time::Duration;

use super::ChunkSource;
use crate::{buffering::chunk::AudioChunk, engine::task::CancelToken, error::Result};

#[derive(Debug, Clone)]
pub struct MemorySource {
    chunks: VecDeque<AudioChunk>,
    sample_rate: u32,
    start_delay: Duration,
    interval: Duration,
    started: bool,
}

impl MemorySource {
    pub fn new(chunks: Vec<AudioChunk>, sample_rate: u32) -> Self {
        Self {
            chunks: chunks.into(),
            sample_rate,
            start_delay: Duration::ZERO,
            interval: Duration::ZERO,
            started: false,
        }
    }

    /// `count` chunks of `chunk_size` samples produced by `fill(index)`.
    pub fn generated(
        count: usize,
        chunk_size: usize,
        sample_rate: u32,
        fill: impl Fn(usize) -> f32,
    ) -> Self {
        let chunks = (0..count)
            .map(|i| AudioChunk::new(vec![fill(i); chunk_size], sample_rate))
            .collect();
        Self::new(chunks, sample_rate)
    }

    /// Hold back the first chunk for `delay`.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Sleep `interval` before every chunk after the first.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl ChunkSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self, cancel: &CancelToken) -> Result<Option<AudioChunk>> {
        if self.chunks.is_empty() {
            return Ok(None);
        }
        let pause = if self.started {
            self.interval
        } else {
            self.started = true;
            self.start_delay
        };
        if !pause.is_zero() && cancel.wait(pause) {
            return Ok(None);
        }
        Ok(self.chunks.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::task::cancel_pair;
    use std::time::Instant;

    #[test]
    fn replays_chunks_in_order_then_ends() {
        let mut source = MemorySource::generated(3, 4, 16_000, |i| i as f32);
        let (_stop, cancel) = cancel_pair();
        for expected in 0..3 {
            let chunk = source.read_chunk(&cancel).unwrap().unwrap();
            assert_eq!(chunk.samples, vec![expected as f32; 4]);
        }
        assert!(source.read_chunk(&cancel).unwrap().is_none());
        assert_eq!(source.sample_rate(), 16_000);
    }

    #[test]
    fn start_delay_is_cancellable() {
        let mut source = MemorySource::generated(1, 4, 16_000, |_| 0.0)
            .with_start_delay(Duration::from_secs(30));
        let (mut stop, cancel) = cancel_pair();
        stop.trigger();
        let start = Instant::now();
        assert!(source.read_chunk(&cancel).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(source.remaining(), 1);
    }
}
