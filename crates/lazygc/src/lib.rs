//! lazygc — a lazy, reference-counted heap.
//!
//! This crate implements a single-threaded memory manager that wraps byte
//! buffers ("regions") behind counted handles and reclaims them lazily: a
//! region whose last reference is freed stays resident until a sweep runs.
//! Sweeps are triggered explicitly via [`Heap::collect`] or automatically by
//! a randomized countdown consulted on every [`Heap::free`].
//!
//! # Architecture
//!
//! 1. **Generational slot arena** — regions and reference nodes live in
//!    slabs addressed by `{index, generation}` ids, so a stale handle fails
//!    lookup instead of aliasing a reused slot.
//! 2. **Intrusive index lists** — all live regions and all live references
//!    are threaded into doubly-linked lists (head insertion, O(1) unlink)
//!    for the sweep walk and for diagnostics.
//! 3. **Deferred reclamation** — freeing a reference only drops a count;
//!    the sweep detaches and frees every zero-count region in one pass.
//!
//! Despite the name, this is not a tracing collector: there is no marking,
//! no cycle detection, and no root set beyond the handles callers hold.
//!
//! # Example
//!
//! ```
//! use lazygc::Heap;
//!
//! let mut heap = Heap::new();
//! let mut r = heap.alloc(16).expect("alloc");
//! assert_eq!(heap.write(r, 0, b"hello"), 5);
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(heap.read(r, 0, &mut buf), 5);
//! assert_eq!(&buf, b"hello");
//!
//! heap.free(&mut r);      // handle is nulled; region is now reclaimable
//! heap.collect();         // region is actually freed here
//! assert_eq!(heap.stats().regions, 0);
//! ```

mod slab;

pub mod heap;
pub mod rng;

pub use heap::{Heap, HeapStats, RefId};
pub use rng::XorShift64Star;
