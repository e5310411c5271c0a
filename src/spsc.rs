//! SPSC Ring Buffer - bounded, lock-free hand-off between two threads.
//!
//! Exactly one producer thread and one consumer thread exchange
//! fixed-layout values through a power-of-two ring. Each side owns one
//! monotonic cursor and keeps a private shadow of the cursor it does not
//! own, so the steady-state hot path reads only thread-local memory.
//! The shared atomics are touched once per slot (the release publish)
//! plus one acquire refresh whenever the shadow makes the ring look
//! full or empty.
//!
//! # Cursor Protocol
//!
//! ```text
//!            producer                          consumer
//!   push_cursor  --- release store --->  push shadow (acquire refresh)
//!   pop shadow   <--- acquire refresh --- pop_cursor (release store)
//! ```
//!
//! Cursors count total elements ever pushed or popped; the slot index is
//! `cursor & (capacity - 1)`. A reserve succeeds when wrapping cursor
//! arithmetic says there is room (push) or data (pop); the matching
//! cursor is published only when the accessor is released, which is what
//! makes the slot contents visible to the other side.

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

use std::cell::UnsafeCell;
use std::error::Error;
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::element::Element;

// ============================================================================
// Shared Ring State
// ============================================================================

/// The ring shared by a [`Producer`]/[`Consumer`] pair.
///
/// Construct with [`SpscQueue::with_capacity`], which hands back the two
/// endpoint handles. The cursors are the only words both threads watch;
/// each lives on its own cache line so the producer's publishes never
/// invalidate the consumer's line and vice versa.
pub struct SpscQueue<T> {
    /// Total elements ever published. Written only by the producer
    /// (release store on accessor release), read by the consumer.
    push_cursor: CachePadded<AtomicUsize>,
    /// Total elements ever consumed. Written only by the consumer
    /// (release store on accessor release), read by the producer.
    pop_cursor: CachePadded<AtomicUsize>,
    /// Slot storage, length `mask + 1`, zero-filled at construction.
    slots: Box<[UnsafeCell<T>]>,
    /// Capacity minus one. Capacity is a power of two, so
    /// `cursor & mask` is the slot index on both paths.
    mask: usize,
}

// SAFETY: slots are reached only through the reserve/publish protocol,
// which gives each slot exactly one accessor at a time; `T: Send` because
// values written on one thread are read on the other.
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T: Element> SpscQueue<T> {
    /// Create a ring and split it into its two endpoint handles.
    ///
    /// Ownership of the handles is the concurrency contract: there is no
    /// way to get a second producer or consumer, and every mutating
    /// operation takes `&mut self`.
    ///
    /// # Arguments
    /// * `capacity` - Number of slots; must be a power of two (>= 1)
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two. Nothing is
    /// rounded silently.
    pub fn with_capacity(capacity: usize) -> (Producer<T>, Consumer<T>) {
        assert!(
            capacity.is_power_of_two(),
            "capacity must be a power of two, got {}",
            capacity
        );

        // Zero-filled slots are valid for every Element, keep partial
        // copies sound, and fault every backing page in before the hot
        // path runs.
        let slots: Box<[UnsafeCell<T>]> = (0..capacity)
            // SAFETY: Element guarantees the all-zero pattern is valid.
            .map(|_| UnsafeCell::new(unsafe { mem::zeroed() }))
            .collect();

        let queue = Arc::new(SpscQueue {
            push_cursor: CachePadded::new(AtomicUsize::new(0)),
            pop_cursor: CachePadded::new(AtomicUsize::new(0)),
            slots,
            mask: capacity - 1,
        });

        (
            Producer {
                queue: Arc::clone(&queue),
                pop_shadow: 0,
            },
            Consumer {
                queue,
                push_shadow: 0,
            },
        )
    }
}

impl<T> SpscQueue<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Raw pointer to the slot a cursor maps to.
    #[inline]
    fn slot(&self, cursor: usize) -> *mut T {
        self.slots[cursor & self.mask].get()
    }

    /// Size as seen from one of the two owning threads.
    ///
    /// Loading the push cursor first keeps the result inside `0..=capacity`
    /// from either end: whichever cursor is remote can only lag, and a
    /// lagging pop cursor is bounded by the admission check that let the
    /// loaded push value be published.
    #[inline]
    fn len_relaxed(&self) -> usize {
        let push = self.push_cursor.load(Ordering::Relaxed);
        let pop = self.pop_cursor.load(Ordering::Relaxed);
        let len = push.wrapping_sub(pop);
        debug_assert!(len <= self.capacity(), "cursor pair out of bounds");
        len
    }
}

impl<T> fmt::Debug for SpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len_relaxed())
            .finish()
    }
}

// ============================================================================
// Full Error
// ============================================================================

/// Returned by [`Producer::push`] when the ring has no free slot.
///
/// Carries the rejected value back to the caller; full is an expected,
/// recoverable condition, not a failure of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T: fmt::Debug> Error for Full<T> {}

// ============================================================================
// Producer
// ============================================================================

/// Writing end of the ring. `Send` but deliberately not clonable: moving
/// it to the producer thread moves the one-and-only push capability.
pub struct Producer<T> {
    queue: Arc<SpscQueue<T>>,
    /// Last pop cursor value this side observed. Refreshed with an
    /// acquire load only when the ring looks full.
    pop_shadow: usize,
}

impl<T: Element> Producer<T> {
    /// Reserve the next slot for writing.
    ///
    /// Returns an accessor bound to the reserved slot, or `None` if the
    /// ring is full even after refreshing the pop shadow. Never blocks
    /// and never spins; retry policy belongs to the caller.
    ///
    /// The new push cursor is published when the accessor is dropped or
    /// [`committed`](PushGuard::commit); [`cancel`](PushGuard::cancel)
    /// abandons the reservation instead.
    #[inline]
    pub fn reserve(&mut self) -> Option<PushGuard<'_, T>> {
        let push = self.queue.push_cursor.load(Ordering::Relaxed);
        if push.wrapping_sub(self.pop_shadow) >= self.queue.capacity() {
            // Looks full, but the shadow may be stale. One fresh look.
            self.pop_shadow = self.queue.pop_cursor.load(Ordering::Acquire);
            if push.wrapping_sub(self.pop_shadow) >= self.queue.capacity() {
                return None;
            }
        }
        Some(PushGuard {
            producer: self,
            cursor: push,
            live: true,
        })
    }

    /// Copy `value` into the ring.
    ///
    /// Equivalent to reserve + [`PushGuard::write`] + implicit release.
    /// The copy honors the value's [`copy_size`](Element::copy_size).
    ///
    /// # Returns
    /// `Err(Full(value))` hands the value back when no slot is free.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), Full<T>> {
        match self.reserve() {
            Some(mut slot) => {
                slot.write(value);
                Ok(())
            }
            None => Err(Full(value)),
        }
    }

    /// Number of occupied slots, from the producer's view. May count
    /// elements the consumer has already popped but not yet visible
    /// here; never undercounts.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len_relaxed()
    }

    /// True when no slot is occupied, from the producer's view.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every slot is occupied, from the producer's view.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Total slot count, fixed at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.queue.capacity())
            .field("len", &self.queue.len_relaxed())
            .finish()
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Reading end of the ring. Mirror of [`Producer`]: one exists per ring,
/// and it alone may advance the pop cursor.
pub struct Consumer<T> {
    queue: Arc<SpscQueue<T>>,
    /// Last push cursor value this side observed. Refreshed with an
    /// acquire load only when the ring looks empty.
    push_shadow: usize,
}

impl<T: Element> Consumer<T> {
    /// Reserve the oldest unconsumed slot for reading.
    ///
    /// Returns an accessor bound to that slot, or `None` if the ring is
    /// empty even after refreshing the push shadow. Never blocks.
    ///
    /// The new pop cursor is published when the accessor is dropped or
    /// [`committed`](PopGuard::commit); [`cancel`](PopGuard::cancel)
    /// leaves the value unconsumed.
    #[inline]
    pub fn reserve(&mut self) -> Option<PopGuard<'_, T>> {
        let pop = self.queue.pop_cursor.load(Ordering::Relaxed);
        if pop == self.push_shadow {
            // Looks empty; the shadow may be stale. One fresh look.
            self.push_shadow = self.queue.push_cursor.load(Ordering::Acquire);
            if pop == self.push_shadow {
                return None;
            }
        }
        Some(PopGuard {
            consumer: self,
            cursor: pop,
            live: true,
        })
    }

    /// Copy the oldest value out of the ring.
    ///
    /// Equivalent to reserve + read + implicit release. Returns `None`
    /// when the ring is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.reserve().map(|slot| *slot)
    }

    /// Number of occupied slots, from the consumer's view. May miss
    /// elements the producer has published but not yet visible here;
    /// never overcounts.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len_relaxed()
    }

    /// True when no slot is occupied, from the consumer's view.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every slot is occupied, from the consumer's view.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Total slot count, fixed at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.queue.capacity())
            .field("len", &self.queue.len_relaxed())
            .finish()
    }
}

// ============================================================================
// Scoped Accessors
// ============================================================================

/// Write access to one reserved slot.
///
/// Dereferences to the slot for in-place construction. Dropping the
/// guard publishes the new push cursor with a release store; that store
/// is the moment the value becomes visible to the consumer. Moving the
/// guard moves the pending publish with it, and the borrow on the
/// producer makes a second reservation impossible while one is live.
pub struct PushGuard<'a, T> {
    producer: &'a mut Producer<T>,
    /// Cursor value this reservation is bound to; `cursor + 1` is what
    /// release publishes.
    cursor: usize,
    live: bool,
}

impl<T: Element> PushGuard<'_, T> {
    /// Copy `value` into the reserved slot, transferring only its
    /// [`copy_size`](Element::copy_size) bytes.
    ///
    /// Shorter-than-full copies leave the tail of the slot as it was,
    /// which the `Element` contract keeps valid.
    #[inline]
    pub fn write(&mut self, value: T) {
        let len = value.copy_size();
        debug_assert!(
            len <= mem::size_of::<T>(),
            "copy_size exceeds the element size"
        );
        let src = &value as *const T as *const MaybeUninit<u8>;
        let dst = self.producer.queue.slot(self.cursor) as *mut MaybeUninit<u8>;
        // SAFETY: the reservation grants exclusive slot access until the
        // cursor is published; `len` is within the element, and copying
        // through MaybeUninit tolerates padding bytes in the source.
        unsafe { ptr::copy_nonoverlapping(src, dst, len) };
    }

    /// Release the accessor, publishing the slot to the consumer.
    ///
    /// Dropping the guard does the same; this form exists for call sites
    /// where the hand-off deserves to be spelled out.
    #[inline]
    pub fn commit(self) {}

    /// Abandon the reservation without publishing.
    ///
    /// The slot is treated as never pushed: the push cursor does not
    /// advance and the consumer can never observe the reservation.
    #[inline]
    pub fn cancel(mut self) {
        self.live = false;
    }
}

impl<T> Deref for PushGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: reserved and unpublished, so this side has exclusive
        // access; slots always hold initialized bytes.
        unsafe { &*self.producer.queue.slot(self.cursor) }
    }
}

impl<T> DerefMut for PushGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`.
        unsafe { &mut *self.producer.queue.slot(self.cursor) }
    }
}

impl<T> Drop for PushGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if self.live {
            // The release store pairs with the consumer's acquire
            // refresh and publishes the slot contents with it.
            self.producer
                .queue
                .push_cursor
                .store(self.cursor.wrapping_add(1), Ordering::Release);
        }
    }
}

impl<T> fmt::Debug for PushGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushGuard")
            .field("cursor", &self.cursor)
            .field("live", &self.live)
            .finish()
    }
}

/// Read access to the oldest unconsumed slot.
///
/// Dereferences to the value. Dropping the guard publishes the new pop
/// cursor with a release store, handing the slot back to the producer
/// for reuse. [`cancel`](PopGuard::cancel) returns without consuming:
/// the next reserve sees the same value again.
pub struct PopGuard<'a, T> {
    consumer: &'a mut Consumer<T>,
    /// Cursor value this reservation is bound to; `cursor + 1` is what
    /// release publishes.
    cursor: usize,
    live: bool,
}

impl<T: Element> PopGuard<'_, T> {
    /// Release the accessor, marking the value consumed.
    #[inline]
    pub fn commit(self) {}

    /// Abandon the reservation. The value is not consumed and the pop
    /// cursor does not advance.
    #[inline]
    pub fn cancel(mut self) {
        self.live = false;
    }
}

impl<T> Deref for PopGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the producer published this slot (acquire load of the
        // push cursor ordered the write before this read) and cannot
        // reuse it until the pop cursor advances past it.
        unsafe { &*self.consumer.queue.slot(self.cursor) }
    }
}

impl<T> Drop for PopGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if self.live {
            // Pairs with the producer's acquire refresh; after this the
            // producer may overwrite the slot.
            self.consumer
                .queue
                .pop_cursor
                .store(self.cursor.wrapping_add(1), Ordering::Release);
        }
    }
}

impl<T> fmt::Debug for PopGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopGuard")
            .field("cursor", &self.cursor)
            .field("live", &self.live)
            .finish()
    }
}
