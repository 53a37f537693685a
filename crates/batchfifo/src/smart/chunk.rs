use crate::invariants::debug_assert_claim_in_window;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// A chunk is a fixed-capacity slab shared between the producer side (under
// the FIFO's tail lock) and the consumer side (under the FIFO's head lock).
// The two sides meet only through the packed `available` word:
//
//   bit 0      = a successor chunk has been linked through `next`
//   bits 1..   = number of readable, not-yet-claimed elements
//
// **Producer (under the tail lock):**
// 1. Write the slot at the write cursor (plain; the slot is not readable yet)
// 2. `fetch_add(2)` on `available` with Release - publishes the write
// 3. When full: allocate a successor, store `next` with Release, then
//    `fetch_or(1)` on `available` with Release - publishes the link
//
// **Consumer (under the head lock):**
// 1. Load `available` with Acquire - observing a count of k guarantees the
//    k preceding slot writes are visible; observing bit 0 guarantees `next`
//    is a valid pointer
// 2. Claim a range: advance the read cursor, `fetch_sub(2 * take)` with
//    Release, bump `references`
//
// ## Single-Writer Invariants
//
// - `write` cursor and `frozen`: tail-lock holders only
// - `read` cursor: head-lock holders only
// - `slots[i]`: written once by the producer before its count increment,
//   immutable afterwards; dropped exactly once when the chunk is freed
//
// ## Lifetime
//
// `references` starts at 1 (the chain's ownership). Every claimed range adds
// one; the chain releases its share when the head moves past the chunk. The
// chunk is freed when the count reaches 0 and no readable elements remain -
// at that point no range borrows it and no producer can reach it (it is
// frozen and behind the head).
//
// =============================================================================

const HAS_NEXT: u64 = 1;
const COUNT_UNIT: u64 = 2;

pub(crate) struct FifoChunk<T> {
    capacity: usize,
    /// Write cursor (number of initialized slots). Tail-lock protected.
    write: UnsafeCell<usize>,
    /// Read cursor (number of claimed slots). Head-lock protected.
    read: UnsafeCell<usize>,
    /// Sealed against further appends (set by a whole-chunk append).
    frozen: UnsafeCell<bool>,
    /// Packed readable count and has-next flag.
    available: AtomicU64,
    next: AtomicPtr<FifoChunk<T>>,
    /// Chain ownership + outstanding claimed ranges.
    references: AtomicUsize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for FifoChunk<T> {}
unsafe impl<T: Send> Sync for FifoChunk<T> {}

impl<T> FifoChunk<T> {
    /// Allocates an empty chunk and leaks it to the chain.
    pub(crate) fn alloc(capacity: usize) -> *mut Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Box::into_raw(Box::new(Self {
            capacity,
            write: UnsafeCell::new(0),
            read: UnsafeCell::new(0),
            frozen: UnsafeCell::new(false),
            available: AtomicU64::new(0),
            next: AtomicPtr::new(ptr::null_mut()),
            references: AtomicUsize::new(1),
            slots: slots.into_boxed_slice(),
        }))
    }

    /// Allocates a chunk pre-filled with `batch` (capacity = batch length).
    ///
    /// The whole batch is made readable in one release increment.
    pub(crate) fn from_batch(batch: Vec<T>) -> *mut Self {
        let len = batch.len();
        let raw = Self::alloc(len);
        // SAFETY: the chunk is not yet linked, so this thread is its only
        // accessor.
        unsafe {
            let chunk = &*raw;
            for (i, value) in batch.into_iter().enumerate() {
                (*chunk.slots[i].get()).write(value);
            }
            *chunk.write.get() = len;
            chunk
                .available
                .fetch_add(len as u64 * COUNT_UNIT, Ordering::Release);
        }
        raw
    }

    // ---------------------------------------------------------------------
    // PRODUCER SIDE (caller holds the FIFO's tail lock)
    // ---------------------------------------------------------------------

    /// True while the chunk accepts further appends.
    pub(crate) fn has_space(&self) -> bool {
        // SAFETY: `write` and `frozen` are tail-lock protected; we are called
        // with that lock held.
        unsafe { !*self.frozen.get() && *self.write.get() < self.capacity }
    }

    /// Appends one element and publishes it.
    pub(crate) fn push(&self, value: T) {
        // SAFETY: tail lock held; the slot at the write cursor has never been
        // published, so no consumer reads it.
        unsafe {
            let write = self.write.get();
            debug_assert!(*write < self.capacity, "push into a full chunk");
            (*self.slots[*write].get()).write(value);
            *write += 1;
        }
        self.available.fetch_add(COUNT_UNIT, Ordering::Release);
    }

    /// Seals the chunk against further appends.
    pub(crate) fn freeze(&self) {
        // SAFETY: tail lock held.
        unsafe {
            *self.frozen.get() = true;
        }
    }

    /// Links `next` as the successor and announces it to consumers.
    pub(crate) fn link_next(&self, next: *mut Self) {
        self.next.store(next, Ordering::Release);
        self.available.fetch_or(HAS_NEXT, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // CONSUMER SIDE (caller holds the FIFO's head lock)
    // ---------------------------------------------------------------------

    /// Returns (readable count, successor exists).
    pub(crate) fn split_available(&self) -> (usize, bool) {
        let data = self.available.load(Ordering::Acquire);
        ((data / COUNT_UNIT) as usize, data & HAS_NEXT != 0)
    }

    /// Loads the successor pointer. Valid once `split_available` reported it.
    pub(crate) fn load_next(&self) -> *mut Self {
        self.next.load(Ordering::Acquire)
    }

    /// Claims up to `*remaining` readable elements, advancing the read
    /// cursor and taking a reference on the chunk. Returns the claimed
    /// window, or `None` when nothing is readable.
    pub(crate) fn claim(&self, remaining: &mut usize) -> Option<(usize, usize)> {
        let (avail, _) = self.split_available();
        let take = avail.min(*remaining);
        if take == 0 {
            return None;
        }

        self.references.fetch_add(1, Ordering::Relaxed);

        // SAFETY: `read` is head-lock protected; we are called with that lock
        // held.
        let start = unsafe {
            let read = self.read.get();
            let start = *read;
            *read += take;
            start
        };
        debug_assert_claim_in_window!(start, take, self.capacity);

        *remaining -= take;
        self.available
            .fetch_sub(take as u64 * COUNT_UNIT, Ordering::Release);

        Some((start, take))
    }

    /// Shared reference to a claimed slot.
    ///
    /// # Safety
    ///
    /// `index` must lie inside a window previously returned by `claim` (the
    /// claim's reference keeps the chunk alive and the slot initialized).
    pub(crate) unsafe fn slot_ref(&self, index: usize) -> &T {
        (*self.slots[index].get()).assume_init_ref()
    }

    // ---------------------------------------------------------------------
    // LIFETIME
    // ---------------------------------------------------------------------

    /// Drops one reference, freeing the chunk when it was the last.
    ///
    /// The chain keeps its reference until the chunk is drained, so in steady
    /// state a chunk is freed exactly when it is both unreferenced and empty.
    /// During FIFO teardown the chain reference goes away regardless, and any
    /// residual elements are dropped with the chunk.
    ///
    /// # Safety
    ///
    /// `raw` must come from [`FifoChunk::alloc`]/[`FifoChunk::from_batch`]
    /// and the caller must own one reference.
    pub(crate) unsafe fn release(raw: *mut Self) {
        let prev = (*raw).references.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            drop(Box::from_raw(raw));
        }
    }
}

impl<T> Drop for FifoChunk<T> {
    fn drop(&mut self) {
        // Every initialized slot is dropped here, claimed or not: ranges only
        // hand out shared references, they never move values out.
        let write = *self.write.get_mut();
        for slot in &mut self.slots[..write] {
            unsafe {
                ptr::drop_in_place((*slot.get()).as_mut_ptr());
            }
        }
    }
}
