//! Physical extent allocator for early kernel bring-up.
//!
//! Before any heap exists, the kernel still needs memory for long-lived
//! structures: page tables, per-CPU areas, device rings. This crate tracks
//! which physical byte ranges are free and hands out variable-sized extents
//! from them. It never allocates to describe its own state: free ranges are
//! recorded in a fixed pool of [`NODE_CAPACITY`] records.
//!
//! # Components
//!
//! - [`pool`]: fixed array of extent records, with unused ones chained into
//!   a free list.
//! - [`directory::Directory`]: address-ordered list of free extents that
//!   coalesces with its neighbours on every insertion.
//! - [`ExtentAllocator`]: first-fit allocation, guarded free, merging of
//!   adjacent allocations, and span-constrained allocation, all behind one
//!   spin lock.
//! - [`summary::Summary`]: the dump printed for operators and before every
//!   fatal abort.
//!
//! # Usage
//!
//! ```rust
//! use core::alloc::Layout;
//!
//! use extent_alloc::{ExtentAllocator, addr::OffsetMap};
//!
//! // On real hardware this is the kernel's direct map; here a host buffer
//! // stands in for physical memory starting at address 0.
//! let layout = Layout::from_size_align(0x1_0000, 0x1000).unwrap();
//! let heap = unsafe { std::alloc::alloc(layout) };
//! let map = OffsetMap::new(heap.expose_provenance(), layout.size());
//!
//! let allocator = ExtentAllocator::<_>::new(map);
//! unsafe {
//!     allocator.release_extent(0, layout.size());
//! }
//!
//! let a = allocator.allocate(100).unwrap();
//! let b = allocator.allocate(100).unwrap();
//! unsafe {
//!     assert!(allocator.merge(a, b));
//!     allocator.free(a);
//! }
//! assert_eq!(allocator.free_bytes(), layout.size());
//!
//! unsafe { std::alloc::dealloc(heap, layout) };
//! ```
//!
//! # Failure model
//!
//! Running out of memory is an ordinary `None`. Running out of extent
//! records while freeing leaks the freed range with a warning. A corrupted
//! allocation header, or a span allocation that cannot be satisfied, dumps
//! the directory through [`log`] and panics.
//!
//! # Concurrency
//!
//! All directory updates take a [`spin::Mutex`], which never sleeps and never
//! allocates, so the allocator may be called from any CPU before a scheduler
//! exists. Interrupt masking around calls made from interrupt context is the
//! caller's responsibility.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod addr;
mod allocator;
pub mod directory;
pub mod error;
pub mod header;
pub mod pool;
pub mod seed;
mod span;
pub mod summary;

pub use self::{
    allocator::ExtentAllocator,
    directory::InsertOutcome,
    pool::Extent,
    seed::{BootMemory, MemRegion, PAGE_SIZE, SeedReport},
};

/// Default number of extent records.
pub const NODE_CAPACITY: usize = 128;
