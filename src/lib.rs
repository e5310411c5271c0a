//! # Flash-Ring
//!
//! A bounded, lock-free SPSC ring buffer for low-latency thread hand-off.
//!
//! ## Design Principles
//!
//! - **Single-Producer, Single-Consumer**: One writer thread, one reader
//!   thread, enforced by ownership of the two handles (no locks, no CAS)
//! - **Cached Cursors**: Each side spins on thread-local state; shared
//!   atomics are touched once per element plus a refresh at the full or
//!   empty boundary
//! - **Cache-Isolated**: The two cursors live on separate 64-byte lines,
//!   so publishing never invalidates the other side's hot line
//! - **Scoped Access**: Reserve an accessor, build or read the value in
//!   place, and the drop publishes; cancel backs out without a trace
//!
//! ## Architecture
//!
//! ```text
//! [Feed Thread] --> [SPSC Ring Buffer] --> [Strategy Thread (Pinned)]
//!    Producer          power-of-two           Consumer
//!    push/reserve      zero-filled slots      pop/reserve
//! ```

pub mod book;
pub mod element;
pub mod spin_lock;
pub mod spsc;

// Re-exports for convenience
pub use book::{LevelBook, LevelUpdate, Side};
pub use element::Element;
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use spsc::{Consumer, Full, PopGuard, Producer, PushGuard, SpscQueue};
