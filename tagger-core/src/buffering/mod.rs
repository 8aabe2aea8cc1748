//! Shared memory between the producer and the consumers.
//!
//! ```text
//! Producer ──append──► RingBuffer slot t ──then──► GroundTruthClock.advance()
//!                                                        │
//!                 Visualizer / Predictor ◄──written()────┘ read slot (t-1) mod N
//! ```
//!
//! Also hosts the lock-free SPSC capture ring that carries raw samples from
//! the real-time audio callback to the producer thread.

pub mod chunk;
pub mod clock;
pub mod ring;
pub mod window;

use std::sync::Arc;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

use chunk::AudioChunk;
use clock::GroundTruthClock;
use ring::RingBuffer;

/// Producer half of the capture ring, held by the audio callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half of the capture ring, held by the producer thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Capture ring capacity: 2^18 = 262 144 f32 samples ≈ 5.4 s at 48 kHz.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair for device capture.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}

/// The ring buffer plus its ground-truth clock.
///
/// One writer (the producer task), many readers (the consumers). The only
/// ordering the type enforces is write-then-publish inside [`append`](Self::append).
#[derive(Debug)]
pub struct SharedMemory {
    ring: RingBuffer,
    clock: GroundTruthClock,
}

impl SharedMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            clock: GroundTruthClock::new(capacity),
        }
    }

    pub fn clock(&self) -> &GroundTruthClock {
        &self.clock
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Store `chunk` at slot `t`, then advance `t`. Producer only.
    ///
    /// Returns the sequence number the chunk was written at.
    pub fn append(&self, chunk: AudioChunk) -> u64 {
        let sequence = self.clock.written();
        self.ring
            .write(self.clock.slot_of(sequence), sequence, Arc::new(chunk));
        self.clock.advance();
        sequence
    }

    /// Occupied slots: grows with each append until the buffer is full.
    pub fn len(&self) -> usize {
        let written = self.clock.written();
        written.min(self.capacity() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.clock.written() == 0
    }

    /// The most recent complete chunk, i.e. slot `(t - 1) mod N`.
    pub fn latest(&self) -> Option<Arc<AudioChunk>> {
        let written = self.clock.written();
        written.checked_sub(1).and_then(|seq| self.chunk_at(seq))
    }

    /// The chunk appended at `sequence`, if its slot still holds it.
    ///
    /// Returns `None` once the slot has been overwritten by a later append,
    /// or when `sequence` has not been published yet.
    pub fn chunk_at(&self, sequence: u64) -> Option<Arc<AudioChunk>> {
        if sequence >= self.clock.written() {
            return None;
        }
        self.ring
            .read(self.clock.slot_of(sequence))
            .filter(|slot| slot.sequence == sequence)
            .map(|slot| slot.chunk)
    }

    /// Oldest sequence a consumer may still read. Slot `t` itself is the
    /// producer's next write target and is excluded.
    pub fn oldest_readable(&self, written: u64) -> u64 {
        written.saturating_sub(self.capacity() as u64 - 1)
    }

    /// `t = 0`, every slot empty. Caller guarantees no task is running.
    pub fn reset(&self) {
        self.clock.reset();
        self.ring.clear();
    }
}
