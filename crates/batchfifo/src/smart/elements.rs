use crate::smart::chunk::FifoChunk;

/// One contiguous claimed window inside a chunk.
pub(crate) struct ClaimedRange<T> {
    pub(crate) chunk: *mut FifoChunk<T>,
    pub(crate) start: usize,
    pub(crate) len: usize,
}

/// The result of a batched `pop`: claimed windows over at most two adjacent
/// chunks, read in FIFO order through [`next`](FifoElements::next).
///
/// Values are borrowed from the chunks, not copied; the ranges hold a
/// reference on each chunk, so the storage stays alive until this handle is
/// dropped (even if the FIFO itself goes away first).
///
/// An empty result means end of stream: all producers terminated and the
/// chain is drained.
pub struct FifoElements<T> {
    ranges: Vec<ClaimedRange<T>>,
    current_range: usize,
    current_index: usize,
}

// Safety: the ranges pin their chunks via reference counts; access to the
// claimed slots is read-only.
unsafe impl<T: Send> Send for FifoElements<T> {}
unsafe impl<T: Sync> Sync for FifoElements<T> {}

impl<T> FifoElements<T> {
    pub(crate) fn new(ranges: Vec<ClaimedRange<T>>) -> Self {
        Self {
            ranges,
            current_range: 0,
            current_index: 0,
        }
    }

    pub(crate) fn end_of_stream() -> Self {
        Self::new(Vec::new())
    }

    /// True when this `pop` hit end of stream (no elements and none coming).
    pub fn is_end_of_stream(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of claimed elements.
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|r| r.len).sum()
    }

    /// True when no elements were claimed.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Yields the next claimed element, in FIFO order.
    pub fn next(&mut self) -> Option<&T> {
        let range = self.ranges.get(self.current_range)?;

        // SAFETY: the index lies inside a claimed window and the range holds
        // a reference on the chunk.
        let value = unsafe { (*range.chunk).slot_ref(range.start + self.current_index) };

        self.current_index += 1;
        if self.current_index == range.len {
            self.current_range += 1;
            self.current_index = 0;
        }

        Some(value)
    }

    /// Runs `f` over every remaining element.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&T),
    {
        while let Some(value) = self.next() {
            f(value);
        }
    }
}

impl<T> Drop for FifoElements<T> {
    fn drop(&mut self) {
        for range in &self.ranges {
            // SAFETY: each range owns exactly one reference on its chunk.
            unsafe {
                FifoChunk::release(range.chunk);
            }
        }
    }
}
