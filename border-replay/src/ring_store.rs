//! Fixed-capacity circular storage.
use crate::error::ReplayError;
use anyhow::Result;
use rand::Rng;

/// Circular storage with overwrite-oldest eviction.
///
/// `put()` writes at the cursor `i`, which wraps modulo `capacity`. Once the
/// store is full, every `put()` discards the oldest item.
#[derive(Debug, Clone)]
pub struct RingStore<T> {
    /// Maximum number of items.
    capacity: usize,

    /// Current insertion index.
    i: usize,

    /// Current number of stored items.
    size: usize,

    /// Slots. `slots.len() == size` until the store becomes full.
    slots: Vec<T>,
}

impl<T> RingStore<T> {
    /// Creates an empty store.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`. Configurations are validated before stores are built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity of RingStore must be positive");
        Self {
            capacity,
            i: 0,
            size: 0,
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Stores `item` and returns its slot id.
    pub fn put(&mut self, item: T) -> usize {
        let slot = self.i;
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[slot] = item;
        }

        self.i = (self.i + 1) % self.capacity;
        if self.size < self.capacity {
            self.size += 1;
        }

        slot
    }

    /// Returns the item stored at `slot`.
    pub fn get(&self, slot: usize) -> Result<&T> {
        self.slots.get(slot).ok_or_else(|| {
            ReplayError::SlotOutOfRange {
                slot,
                len: self.size,
            }
            .into()
        })
    }

    /// Draws `k` slot ids uniformly at random with replacement from `[0, len)`.
    pub fn sample_uniform<R: Rng>(&self, k: usize, rng: &mut R) -> Result<Vec<usize>> {
        if self.size == 0 {
            return Err(ReplayError::EmptyStore.into());
        }
        Ok((0..k).map(|_| rng.gen_range(0..self.size)).collect())
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot that the next `put()` writes to.
    pub fn cursor(&self) -> usize {
        self.i
    }

    /// Returns `true` if the next `put()` overwrites an item.
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Iterates over stored items from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let start = if self.is_full() { self.i } else { 0 };
        (0..self.size).map(move |j| &self.slots[(start + j) % self.capacity])
    }
}
