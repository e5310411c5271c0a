//! Element contract for ring payloads.
//!
//! The ring hands out direct slot access across two threads and fills its
//! storage byte-wise, so payloads must tolerate zero initialization,
//! plain memory copies, and overwrite without cleanup. `Element` states
//! that contract once; every slot operation in the queue relies on it.

use std::mem;

/// Marker trait for values that can travel through the ring.
///
/// # Safety
///
/// Implementors guarantee all of the following:
///
/// - The type is plain old data: no drop obligations, no references or
///   owning pointers that a byte-wise copy would duplicate.
/// - The all-zero byte pattern is a valid value (slots are zero-filled
///   when the ring is built).
/// - A valid value stays valid after its first `copy_size()` bytes are
///   overwritten with the same-length prefix of another valid value, so
///   partial copies never assemble an invalid bit pattern.
/// - `copy_size()` never exceeds `size_of::<Self>()`.
///
/// Types with invalid bit patterns (`bool`, `char`, most enums) must not
/// implement this trait unless their layout makes every pattern the ring
/// can produce a valid value.
pub unsafe trait Element: Copy {
    /// Number of bytes the copy-based push transfers for this value.
    ///
    /// Defaults to the full element size. Override it to pack
    /// variable-length payloads into fixed-size slots: a short message
    /// then copies only its meaningful prefix and the rest of the slot
    /// keeps whatever initialized bytes it already held.
    #[inline]
    fn copy_size(&self) -> usize {
        mem::size_of::<Self>()
    }
}

macro_rules! impl_element {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: plain numeric type; every bit pattern is a valid value.
            unsafe impl Element for $ty {}
        )*
    };
}

impl_element!(u8, u16, u32, u64, u128, usize);
impl_element!(i8, i16, i32, i64, i128, isize);
impl_element!(f32, f64);

// SAFETY: zero-sized, nothing to copy.
unsafe impl Element for () {}

// SAFETY: arrays inherit the contract elementwise; a prefix overwrite
// splits at most one inner element, which tolerates prefix overwrites by
// its own contract.
unsafe impl<T: Element, const N: usize> Element for [T; N] {}
