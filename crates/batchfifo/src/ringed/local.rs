use std::mem::MaybeUninit;
use std::ptr;
use thiserror::Error;

/// Error returned by [`LocalRing::resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResizeError {
    /// The ring holds more elements than the requested capacity.
    #[error("cannot shrink ring to {requested} slots while holding {resident} elements")]
    WouldDropElements {
        /// Elements currently resident.
        resident: usize,
        /// Capacity that was requested.
        requested: usize,
    },
}

/// Bounded ring buffer with explicit occupancy, used both as the central
/// ring of a queue master and as the per-view batching buffer.
///
/// Not thread-safe on its own: the master ring lives under the master lock
/// and each view ring belongs to exactly one participant.
pub struct LocalRing<T> {
    buf: Box<[MaybeUninit<T>]>,
    /// Index of the oldest element.
    head: usize,
    len: usize,
}

impl<T> LocalRing<T> {
    /// Creates a ring with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least 1");
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, MaybeUninit::uninit);
        Self {
            buf: buf.into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Appends `value`; hands it back if the ring is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let idx = (self.head + self.len) % self.capacity();
        self.buf[idx].write(value);
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the oldest element.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: slots in [head, head + len) are initialized; the slot is
        // vacated before head moves past it.
        let value = unsafe { self.buf[self.head].assume_init_read() };
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(value)
    }

    /// Reallocates the ring to `new_capacity`, preserving element order.
    ///
    /// Growing always succeeds. Shrinking succeeds only when the resident
    /// element count fits the new capacity; otherwise the ring is left
    /// untouched and the caller keeps its previous capacity.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), ResizeError> {
        assert!(new_capacity >= 1, "ring capacity must be at least 1");

        if new_capacity < self.len {
            return Err(ResizeError::WouldDropElements {
                resident: self.len,
                requested: new_capacity,
            });
        }
        if new_capacity == self.capacity() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(new_capacity);
        buf.resize_with(new_capacity, MaybeUninit::uninit);
        let mut buf = buf.into_boxed_slice();

        let len = self.len;
        let capacity = self.capacity();
        for (slot, offset) in buf.iter_mut().zip(0..len) {
            // SAFETY: source slots in [head, head + len) are initialized; the
            // old buffer is discarded without dropping, so each value moves
            // exactly once.
            unsafe {
                slot.write(self.buf[(self.head + offset) % capacity].assume_init_read());
            }
        }

        self.buf = buf;
        self.head = 0;
        Ok(())
    }
}

impl<T> Drop for LocalRing<T> {
    fn drop(&mut self) {
        let capacity = self.capacity();
        for offset in 0..self.len {
            let idx = (self.head + offset) % capacity;
            unsafe {
                ptr::drop_in_place(self.buf[idx].as_mut_ptr());
            }
        }
    }
}
