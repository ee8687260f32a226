//! Generational slot arena for variable-size payloads.
//!
//! Fixed-layout records carry a [`PayloadHandle`] instead of owning their
//! strings and maps. Releasing a payload bumps its slot's generation, so a
//! handle kept past release is detected instead of aliasing the slot's
//! next occupant.

use chronoscope_core::{Error, Result};

/// Reference to a payload stored in a [`PayloadArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct PayloadHandle {
    index: u32,
    generation: u32,
}

impl PayloadHandle {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when the handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    const fn stale(self) -> Error {
        Error::StaleHandle {
            index: self.index,
            generation: self.generation,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with explicit release and slot reuse.
pub struct PayloadArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for PayloadArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PayloadArena<T> {
    /// Create an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store `value`, reusing a released slot when one is free.
    pub fn insert(&mut self, value: T) -> PayloadHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return PayloadHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        PayloadHandle {
            index,
            generation: 0,
        }
    }

    fn slot(&self, handle: PayloadHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    /// Payload behind `handle`, if it is still live.
    #[must_use]
    pub fn get(&self, handle: PayloadHandle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    /// Mutable payload behind `handle`, if it is still live.
    pub fn get_mut(&mut self, handle: PayloadHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .value
            .as_mut()
    }

    /// Check if `handle` refers to a live payload.
    #[must_use]
    pub fn contains(&self, handle: PayloadHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove and return the payload, invalidating every copy of `handle`.
    pub fn release(&mut self, handle: PayloadHandle) -> Result<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or_else(|| handle.stale())?;
        let value = slot.value.take().ok_or_else(|| handle.stale())?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Ok(value)
    }

    /// Number of live payloads.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if no payload is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}
