//! The header placed in front of every payload.
//!
//! ```text
//! ┌──────────────────────────────┬─────────────────────────────┐
//! │ Header (16 bytes)            │ payload                     │
//! │ ┌─────────────┬────────────┐ │                             │
//! │ │ size: usize │ guard      │ │                             │
//! │ └─────────────┴────────────┘ │                             │
//! └──────────────────────────────┴─────────────────────────────┘
//! ^ block base                   ^ pointer handed to the caller
//! └──────────────────────── size ──────────────────────────────┘
//! ```
//!
//! `size` covers the whole block, header and rounding included, so the block
//! can be handed straight back to the directory on free.

use core::ptr::{self, NonNull};

/// Sentinel stored in the header of every live allocation ("HOLE").
pub const GUARD: usize = 0x484F_4C45;

/// Granularity of block sizes: one 64-bit word.
pub const BLOCK_ALIGN: usize = size_of::<u64>();

/// Bytes of bookkeeping in front of every payload.
pub const HEADER_SIZE: usize = size_of::<Header>();
const _: () = assert!(HEADER_SIZE.is_multiple_of(BLOCK_ALIGN));

/// Returns the number of bytes a request for `size` payload bytes consumes,
/// or `None` if that does not fit in a `usize`.
///
/// # Examples
///
/// ```
/// use extent_alloc::header::{block_size, HEADER_SIZE};
///
/// assert_eq!(block_size(100), Some((100 + HEADER_SIZE).next_multiple_of(8)));
/// assert_eq!(block_size(usize::MAX), None);
/// ```
#[must_use]
pub const fn block_size(size: usize) -> Option<usize> {
    let Some(size) = size.checked_add(HEADER_SIZE) else {
        return None;
    };
    size.checked_next_multiple_of(BLOCK_ALIGN)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) size: usize,
    pub(crate) guard: usize,
}

impl Header {
    pub(crate) const fn new(size: usize) -> Self {
        Self { size, guard: GUARD }
    }

    pub(crate) const fn is_valid(&self) -> bool {
        self.guard == GUARD
    }

    /// Virtual address of the header belonging to `payload`.
    pub(crate) fn addr_of(payload: NonNull<u8>) -> usize {
        payload.addr().get() - HEADER_SIZE
    }

    /// Payload pointer for the header at `header_va`.
    pub(crate) fn payload(header_va: usize) -> NonNull<u8> {
        let payload = ptr::with_exposed_provenance_mut::<u8>(header_va + HEADER_SIZE);
        // A header never occupies the last bytes of the address space, so the
        // payload address cannot wrap around to zero.
        unsafe { NonNull::new_unchecked(payload) }
    }

    /// Reads the header at `header_va`.
    ///
    /// # Safety
    ///
    /// `header_va..header_va + HEADER_SIZE` must be readable. It need not be
    /// aligned.
    pub(crate) unsafe fn read(header_va: usize) -> Self {
        unsafe { ptr::with_exposed_provenance::<Self>(header_va).read_unaligned() }
    }

    /// Writes `self` to `header_va`.
    ///
    /// # Safety
    ///
    /// `header_va..header_va + HEADER_SIZE` must be writable and not in use by
    /// anything else. It need not be aligned.
    pub(crate) unsafe fn write(self, header_va: usize) {
        unsafe { ptr::with_exposed_provenance_mut::<Self>(header_va).write_unaligned(self) }
    }
}
