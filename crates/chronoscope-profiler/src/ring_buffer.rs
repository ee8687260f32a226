//! Fixed-capacity ring that overwrites its oldest entry when full.

/// Circular buffer over a boxed slice allocated once at construction.
///
/// Pushing into a full ring evicts the oldest value; the ring never grows.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Box<[T]>,
    /// Index of the oldest value.
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create an empty ring. A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Append a value, returning the evicted one if the ring was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.slots.len();
        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = value;
            self.len += 1;
            None
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.head], value);
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let capacity = self.slots.len();
        (0..self.len).map(move |i| self.slots[(self.head + i) % capacity])
    }

    /// Copy the contents out, oldest-first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Number of values held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the ring is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of values held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every value, keeping the allocation.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
