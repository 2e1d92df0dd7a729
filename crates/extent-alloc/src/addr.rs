//! Address arithmetic and the physical-to-virtual translation seam.
//!
//! The free-extent directory only ever stores physical addresses. Whenever the
//! allocator has to touch memory (to write or validate an allocation header)
//! it goes through a [`PhysMap`], which the platform supplies at construction
//! time.

/// Alignment helpers for plain addresses.
pub trait Align: Sized {
    /// Rounds down to a multiple of `align`, which must be non-zero.
    fn align_down(&self, align: usize) -> Self;
}

impl Align for usize {
    fn align_down(&self, align: usize) -> Self {
        self / align * align
    }
}

/// Translation between physical addresses and addresses the CPU can
/// dereference.
///
/// Implementations must be a bijection over the addressable window:
/// `virt_to_phys(phys_to_virt(pa)) == pa` for every `pa` with
/// `addressable_len(pa) > 0`.
pub trait PhysMap: Sync {
    /// Returns the virtual address at which physical address `pa` is visible.
    fn phys_to_virt(&self, pa: usize) -> usize;

    /// Returns the physical address backing virtual address `va`.
    fn virt_to_phys(&self, va: usize) -> usize;

    /// Returns how many bytes starting at `pa` are reachable through this
    /// mapping, or `0` if `pa` itself lies outside the window.
    fn addressable_len(&self, pa: usize) -> usize;
}

/// A direct map placing physical `[0, limit)` at a fixed virtual offset.
///
/// With `offset == 0` this is an identity map.
///
/// # Examples
///
/// ```
/// use extent_alloc::addr::{OffsetMap, PhysMap as _};
///
/// let map = OffsetMap::new(0xffff_8000_0000_0000, 0x4000_0000);
/// assert_eq!(map.phys_to_virt(0x1000), 0xffff_8000_0000_1000);
/// assert_eq!(map.virt_to_phys(0xffff_8000_0000_1000), 0x1000);
/// assert_eq!(map.addressable_len(0x3fff_f000), 0x1000);
/// assert_eq!(map.addressable_len(0x4000_0000), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetMap {
    offset: usize,
    limit: usize,
}

impl OffsetMap {
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn identity(limit: usize) -> Self {
        Self::new(0, limit)
    }
}

impl PhysMap for OffsetMap {
    fn phys_to_virt(&self, pa: usize) -> usize {
        debug_assert!(pa <= self.limit, "{pa:#x} is outside the direct map");
        self.offset.wrapping_add(pa)
    }

    fn virt_to_phys(&self, va: usize) -> usize {
        va.wrapping_sub(self.offset)
    }

    fn addressable_len(&self, pa: usize) -> usize {
        self.limit.saturating_sub(pa)
    }
}
