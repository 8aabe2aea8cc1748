//! Ground-truth position shared by the producer and every consumer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Single-writer / multi-reader position counter.
///
/// Internally the clock counts every append since the last reset (`written`).
/// The ring position `t = written mod N` is derived from it, so readers get a
/// consistent `(t, written)` pair from one atomic load.
///
/// The producer calls [`advance`](Self::advance) only after the slot write has
/// completed; the `Release` store pairs with the `Acquire` load in
/// [`written`](Self::written), so a reader that observes an advanced count
/// also observes the chunk behind it.
#[derive(Debug)]
pub struct GroundTruthClock {
    written: AtomicU64,
    capacity: usize,
}

impl GroundTruthClock {
    pub fn new(capacity: usize) -> Self {
        Self {
            written: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Total appends since the last reset.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Ring position `t` in `[0, N)`: the next write target.
    pub fn position(&self) -> usize {
        self.slot_of(self.written())
    }

    /// Slot holding the most recent complete chunk, `(t - 1) mod N`.
    /// `None` before the first append.
    pub fn latest_slot(&self) -> Option<usize> {
        let written = self.written();
        (written > 0).then(|| self.slot_of(written - 1))
    }

    /// Publish one more completed write. Producer only.
    pub fn advance(&self) -> u64 {
        // Single writer: a plain load/store pair is enough, no RMW needed.
        let next = self.written.load(Ordering::Relaxed) + 1;
        self.written.store(next, Ordering::Release);
        next
    }

    /// Back to `t = 0`. Only called while no task is running.
    pub fn reset(&self) {
        self.written.store(0, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_of(&self, sequence: u64) -> usize {
        (sequence % self.capacity as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_wraps_modulo_capacity() {
        let clock = GroundTruthClock::new(4);
        assert_eq!(clock.position(), 0);
        assert_eq!(clock.latest_slot(), None);
        for _ in 0..5 {
            clock.advance();
        }
        assert_eq!(clock.written(), 5);
        assert_eq!(clock.position(), 1);
        assert_eq!(clock.latest_slot(), Some(0));
    }

    #[test]
    fn reset_returns_to_zero() {
        let clock = GroundTruthClock::new(3);
        clock.advance();
        clock.advance();
        clock.reset();
        assert_eq!(clock.written(), 0);
        assert_eq!(clock.position(), 0);
        assert_eq!(clock.latest_slot(), None);
    }
}
