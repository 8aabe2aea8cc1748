//! Fixed-capacity slot store for raw audio chunks.

use std::sync::Arc;

use parking_lot::RwLock;

use super::chunk::AudioChunk;

/// One occupied slot: the chunk plus the append sequence number it was
/// written at, so a reader can tell a fresh occupant from the one it wanted.
#[derive(Debug, Clone)]
pub struct Slot {
    pub sequence: u64,
    pub chunk: Arc<AudioChunk>,
}

/// Circular store of `N` slots. Slot `i` always holds the chunk most
/// recently written at a logical position congruent to `i mod N`.
///
/// Writes take the lock exclusively for the duration of a pointer swap;
/// readers clone the `Arc` out, so no reader ever sees a half-written chunk.
#[derive(Debug)]
pub struct RingBuffer {
    slots: RwLock<Vec<Option<Slot>>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: RwLock::new(vec![None; capacity]),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `chunk` at `slot`, replacing the previous occupant.
    pub fn write(&self, slot: usize, sequence: u64, chunk: Arc<AudioChunk>) {
        let mut slots = self.slots.write();
        slots[slot % self.capacity] = Some(Slot { sequence, chunk });
    }

    pub fn read(&self, slot: usize) -> Option<Slot> {
        self.slots.read()[slot % self.capacity].clone()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().iter().all(Option::is_none)
    }

    pub fn clear(&self) {
        self.slots.write().iter_mut().for_each(|s| *s = None);
    }
}
