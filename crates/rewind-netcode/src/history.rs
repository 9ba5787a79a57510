//! Tick-indexed history buffer.

use rewind_net::{Tick, TickStamped};

/// Default number of slots (16 s at 64 Hz).
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fixed-capacity ring mapping a tick to a payload.
///
/// Slot `tick % capacity` holds whatever was last written there, so a value
/// survives exactly until the tick `capacity` steps later overwrites it.
/// Reads never fail: [`get`](Self::get) may return a value written for a
/// different tick, and callers that care use [`get_exact`](Self::get_exact).
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    slots: Vec<Option<T>>,
}

impl<T> HistoryRing<T> {
    /// Creates an empty ring.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history ring capacity must be non-zero");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot index used for `tick`.
    pub fn slot(&self, tick: Tick) -> usize {
        tick as usize % self.slots.len()
    }

    /// Writes `value` at `tick`'s slot, overwriting what was there.
    pub fn add(&mut self, value: T, tick: Tick) {
        let slot = self.slot(tick);
        self.slots[slot] = Some(value);
    }

    /// Reads `tick`'s slot. `None` only if the slot was never written.
    pub fn get(&self, tick: Tick) -> Option<&T> {
        self.slots[self.slot(tick)].as_ref()
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl<T: TickStamped> HistoryRing<T> {
    /// Reads `tick`'s slot only if the stored payload was stamped for `tick`.
    ///
    /// Returns `None` for never-written slots and for slots that were
    /// overwritten by another tick (wraparound) or still hold an older one.
    pub fn get_exact(&self, tick: Tick) -> Option<&T> {
        self.get(tick).filter(|value| value.tick() == tick)
    }
}
