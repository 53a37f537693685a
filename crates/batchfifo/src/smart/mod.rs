//! Chunked smart-FIFO: an MPMC queue carried by a forward-only chain of
//! fixed-size chunks.
//!
//! Producers append under a coarse tail lock; element visibility rides on a
//! per-chunk packed atomic, so consumers observe whole batches with a single
//! acquire load. Consumers claim contiguous ranges (at most two adjacent
//! chunks per pop) under a head lock and read the values in place; drained
//! chunks are freed as soon as the chain and every outstanding range let go
//! of them.

mod chunk;
mod elements;

use crate::invariants::debug_assert_termination_count;
use crate::ringed::Reconfigure;
use crate::semaphore::Semaphore;
use crate::smart::chunk::FifoChunk;
use crate::smart::elements::ClaimedRange;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use elements::FifoElements;

/// Number of terminated producers is packed in the high half, registered
/// producers in the low half.
const DONE_UNIT: u64 = 1 << 32;
const PRODUCER_MASK: u64 = DONE_UNIT - 1;

/// Shared body of the chunked FIFO. Create producer and consumer views with
/// [`SmartFifo::producer`] and [`SmartFifo::consumer`].
pub struct SmartFifo<T> {
    chunk_capacity: usize,
    /// First chunk with unclaimed elements. Consumer-lock protected.
    head: Mutex<*mut FifoChunk<T>>,
    /// Chunk receiving appends. Producer-lock protected.
    tail: Mutex<*mut FifoChunk<T>>,
    /// done count << 32 | producer count.
    counts: CachePadded<AtomicU64>,
    /// Parks a consumer while the head chunk is empty. At most one consumer
    /// waits here; the others queue on the head lock.
    sem: Semaphore,
}

// Safety: the raw chain pointers are only dereferenced under their lock; the
// chunks themselves synchronise element visibility.
unsafe impl<T: Send> Send for SmartFifo<T> {}
unsafe impl<T: Send> Sync for SmartFifo<T> {}

impl<T> SmartFifo<T> {
    /// Creates a FIFO whose chain grows in chunks of `chunk_capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_capacity == 0`.
    pub fn new(chunk_capacity: usize) -> Self {
        assert!(chunk_capacity >= 1, "chunk capacity must be at least 1");
        let first = FifoChunk::alloc(chunk_capacity);
        Self {
            chunk_capacity,
            head: Mutex::new(first),
            tail: Mutex::new(first),
            counts: CachePadded::new(AtomicU64::new(0)),
            sem: Semaphore::new(0),
        }
    }

    /// Registers a producer view.
    pub fn producer(self: &Arc<Self>) -> SmartProducer<T> {
        self.counts.fetch_add(1, Ordering::AcqRel);
        SmartProducer {
            fifo: Arc::clone(self),
        }
    }

    /// Registers a consumer view popping `batch` elements at a time.
    pub fn consumer(self: &Arc<Self>, batch: usize) -> SmartConsumer<T> {
        assert!(batch >= 1, "pop batch must be at least 1");
        SmartConsumer {
            fifo: Arc::clone(self),
            batch,
            reconfigure: None,
            ops: 0,
        }
    }

    /// Registers a consumer view that switches to a new batch size after a
    /// fixed number of pops.
    pub fn consumer_with_reconfigure(
        self: &Arc<Self>,
        batch: usize,
        reconfigure: Reconfigure,
    ) -> SmartConsumer<T> {
        let mut consumer = self.consumer(batch);
        consumer.reconfigure = Some(reconfigure);
        consumer
    }

    /// True once every registered producer has terminated.
    pub fn terminated(&self) -> bool {
        let counts = self.counts.load(Ordering::Acquire);
        counts >> 32 == counts & PRODUCER_MASK
    }

    /// The configured chunk capacity.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    fn push(&self, value: T) {
        {
            let mut tail = self.tail.lock().unwrap();
            // SAFETY: the tail pointer is valid while the FIFO lives and we
            // hold the tail lock.
            let chunk = unsafe { &**tail };
            if chunk.has_space() {
                chunk.push(value);
            } else {
                let fresh = FifoChunk::alloc(self.chunk_capacity);
                // SAFETY: `fresh` is unlinked; this thread is its only
                // accessor until `link_next` publishes it.
                unsafe {
                    (*fresh).push(value);
                }
                chunk.link_next(fresh);
                *tail = fresh;
            }
        }

        self.sem.post_if_unconsumed();
    }

    fn push_batch(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }

        let fresh = FifoChunk::from_batch(batch);
        {
            let mut tail = self.tail.lock().unwrap();
            // SAFETY: tail lock held.
            let chunk = unsafe { &**tail };
            chunk.freeze();
            chunk.link_next(fresh);
            *tail = fresh;
        }

        self.sem.post_if_unconsumed();
    }

    fn terminate_producer(&self) {
        let counts = self.counts.fetch_add(DONE_UNIT, Ordering::AcqRel) + DONE_UNIT;
        debug_assert_termination_count!(counts >> 32, counts & PRODUCER_MASK);

        if counts >> 32 == counts & PRODUCER_MASK {
            // One post suffices: at most one consumer waits on the semaphore,
            // and consumers arriving later observe the termination first.
            self.sem.post();
        }
    }

    fn pop(&self, n: usize) -> FifoElements<T> {
        let mut head = self.head.lock().unwrap();

        loop {
            // SAFETY: head pointer valid under the head lock.
            let chunk = unsafe { &**head };
            let (avail, has_next) = chunk.split_available();

            if avail > 0 {
                break;
            }
            if has_next {
                self.advance_head(&mut head);
                continue;
            }
            if self.terminated() {
                // Re-check: a producer may have pushed between the
                // availability load and its terminate.
                let (avail, has_next) = chunk.split_available();
                if avail == 0 && !has_next {
                    return FifoElements::end_of_stream();
                }
                continue;
            }
            self.sem.wait();
        }

        let mut remaining = n;
        let mut ranges = Vec::with_capacity(2);

        // SAFETY: head pointer valid under the head lock.
        let first = *head;
        if let Some((start, len)) = unsafe { (*first).claim(&mut remaining) } {
            ranges.push(ClaimedRange {
                chunk: first,
                start,
                len,
            });
        }

        if remaining > 0 {
            // The head chunk ran dry mid-request; a pop may continue into the
            // successor, but never further.
            let chunk = unsafe { &**head };
            let (avail, has_next) = chunk.split_available();
            if avail == 0 && has_next {
                self.advance_head(&mut head);
                let second = *head;
                if let Some((start, len)) = unsafe { (*second).claim(&mut remaining) } {
                    ranges.push(ClaimedRange {
                        chunk: second,
                        start,
                        len,
                    });
                }
            }
        }

        FifoElements::new(ranges)
    }

    /// Moves the head to the successor and releases the chain's reference on
    /// the chunk left behind.
    fn advance_head(&self, head: &mut std::sync::MutexGuard<'_, *mut FifoChunk<T>>) {
        // SAFETY: head lock held; the has-next flag was observed, so the
        // successor pointer is published.
        unsafe {
            let old = **head;
            let next = (*old).load_next();
            debug_assert!(!next.is_null(), "has-next flag set without a successor");
            **head = next;
            FifoChunk::release(old);
        }
    }
}

impl<T> Drop for SmartFifo<T> {
    fn drop(&mut self) {
        // Release the chain's reference on every remaining chunk. Outstanding
        // `FifoElements` keep theirs, so their chunks survive this walk.
        let mut current = *self.head.get_mut().unwrap();
        while !current.is_null() {
            // SAFETY: exclusive access during drop; each chunk in the chain
            // carries exactly one chain reference.
            unsafe {
                let next = (*current).load_next();
                FifoChunk::release(current);
                current = next;
            }
        }
    }
}

/// Producer view of a [`SmartFifo`].
pub struct SmartProducer<T> {
    fifo: Arc<SmartFifo<T>>,
}

impl<T> SmartProducer<T> {
    /// Appends one element; wakes a parked consumer if there is one.
    ///
    /// Non-blocking apart from the short critical section at the chunk tail.
    #[inline]
    pub fn push(&self, value: T) {
        self.fifo.push(value);
    }

    /// Appends an externally prepared batch as one sealed chunk.
    ///
    /// The current tail chunk is frozen (even if not full) and the batch is
    /// linked after it, preserving this producer's FIFO order.
    pub fn push_batch(&self, batch: Vec<T>) {
        self.fifo.push_batch(batch);
    }

    /// Signals that this producer is done.
    ///
    /// Consumes the view, so a producer cannot terminate twice. Once every
    /// producer has terminated, consumers drain the chain and then observe
    /// end of stream.
    pub fn terminate(self) {
        self.fifo.terminate_producer();
    }
}

/// Consumer view of a [`SmartFifo`], popping `batch` elements at a time.
pub struct SmartConsumer<T> {
    fifo: Arc<SmartFifo<T>>,
    batch: usize,
    reconfigure: Option<Reconfigure>,
    ops: u64,
}

impl<T> SmartConsumer<T> {
    /// Claims up to the view's batch size. Blocks while the FIFO is empty
    /// and not terminated; an empty result is end of stream.
    pub fn pop(&mut self) -> FifoElements<T> {
        self.ops += 1;
        if let Some(reconfigure) = self.reconfigure {
            if self.ops == reconfigure.after_ops {
                self.batch = reconfigure.new_step.max(1);
            }
        }
        self.fifo.pop(self.batch)
    }

    /// Claims up to `n` elements regardless of the configured batch size.
    pub fn pop_n(&mut self, n: usize) -> FifoElements<T> {
        assert!(n >= 1, "pop batch must be at least 1");
        self.fifo.pop(n)
    }

    /// Pops a single element by value. `None` is end of stream.
    ///
    /// Element-wise convenience for consumers that cannot hold a claimed
    /// range open; batch consumers should prefer [`pop`](Self::pop).
    pub fn pop_copy(&mut self) -> Option<T>
    where
        T: Clone,
    {
        let mut elements = self.fifo.pop(1);
        elements.next().cloned()
    }

    /// The current batch size.
    pub fn batch(&self) -> usize {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_single_chunk() {
        let fifo = Arc::new(SmartFifo::<u64>::new(16));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(16);

        for i in 0..10 {
            producer.push(i);
        }

        let mut elements = consumer.pop();
        let mut seen = Vec::new();
        elements.for_each(|v| seen.push(*v));
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_spans_two_chunks() {
        let fifo = Arc::new(SmartFifo::<u64>::new(4));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(6);

        for i in 0..8 {
            producer.push(i);
        }

        // First chunk holds 0..4; the claim continues into the second chunk
        // for the remaining 2 of the 6 requested.
        let mut elements = consumer.pop();
        assert_eq!(elements.len(), 6);
        let mut seen = Vec::new();
        elements.for_each(|v| seen.push(*v));
        assert_eq!(seen, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_end_of_stream_after_drain() {
        let fifo = Arc::new(SmartFifo::<u64>::new(4));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(4);

        producer.push(1);
        producer.terminate();

        let mut elements = consumer.pop();
        assert_eq!(elements.next(), Some(&1));
        assert_eq!(elements.next(), None);
        drop(elements);

        assert!(consumer.pop().is_end_of_stream());
        assert!(consumer.pop().is_end_of_stream());
    }

    #[test]
    fn test_push_batch_preserves_order() {
        let fifo = Arc::new(SmartFifo::<u64>::new(8));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(16);

        producer.push(1);
        producer.push_batch(vec![2, 3, 4]);
        producer.push(5);
        producer.terminate();

        let mut seen = Vec::new();
        loop {
            let mut elements = consumer.pop();
            if elements.is_end_of_stream() {
                break;
            }
            elements.for_each(|v| seen.push(*v));
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_chunk_capacity_one_degenerates_to_elementwise() {
        let fifo = Arc::new(SmartFifo::<u64>::new(1));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(1);

        for i in 0..5 {
            producer.push(i);
        }
        producer.terminate();

        let mut seen = Vec::new();
        loop {
            let mut elements = consumer.pop();
            if elements.is_end_of_stream() {
                break;
            }
            elements.for_each(|v| seen.push(*v));
        }
        assert_eq!(seen, (0..5).collect::<Vec<_>>());
    }

    #[test]
    fn test_consumer_reconfigure_changes_batch() {
        let fifo = Arc::new(SmartFifo::<u64>::new(64));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer_with_reconfigure(
            2,
            Reconfigure {
                after_ops: 3,
                new_step: 8,
            },
        );

        for i in 0..32 {
            producer.push(i);
        }

        assert_eq!(consumer.pop().len(), 2);
        assert_eq!(consumer.pop().len(), 2);
        // Third pop switches to the new batch size first.
        assert_eq!(consumer.pop().len(), 8);
        assert_eq!(consumer.batch(), 8);
    }

    #[test]
    fn test_pop_copy_streams_by_value() {
        let fifo = Arc::new(SmartFifo::<String>::new(4));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(4);

        for word in ["a", "b", "c"] {
            producer.push(word.to_owned());
        }
        producer.terminate();

        let mut seen = Vec::new();
        while let Some(word) = consumer.pop_copy() {
            seen.push(word);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_values_outlive_fifo_drop() {
        let fifo = Arc::new(SmartFifo::<String>::new(4));
        let producer = fifo.producer();
        let mut consumer = fifo.consumer(4);

        producer.push("alive".to_owned());
        let mut elements = consumer.pop();

        // Drop every handle on the FIFO; the claimed range pins its chunk
        // past the FIFO's death.
        drop(producer);
        drop(consumer);
        drop(fifo);

        assert_eq!(elements.next().map(String::as_str), Some("alive"));
    }
}
