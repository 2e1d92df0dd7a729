//! Allocations that must sit inside one span-aligned window.
//!
//! Some early structures (DMA rings, page-table roots, hardware windows) must
//! not straddle a boundary that is a multiple of some power of two. The span
//! allocator over-allocates by `align + span` bytes, moves to the next span
//! boundary inside the block, and hands the unused prefix and suffix back to
//! the directory:
//!
//! ```text
//! a                v                        v+size+align       a+size+align+span
//! ├── prefix ──────┼────── kept (size + align) ──┼────── suffix ──────┤
//!  released         ^ span boundary                released
//! ```
//!
//! `prefix + suffix == span`, so only `size + align` bytes (plus the block
//! header and rounding) stay in use.

use core::ptr::{self, NonNull};

use crate::{
    ExtentAllocator,
    addr::{Align as _, PhysMap},
    error::SpanExhaustedSnafu,
};

impl<M, const N: usize> ExtentAllocator<M, N>
where
    M: PhysMap,
{
    /// Allocates `size` zeroed bytes aligned to `align`, starting at most
    /// `align` bytes past a `span`-aligned boundary.
    ///
    /// A `span` of 2 or less disables the boundary constraint and an `align`
    /// of 1 or less disables alignment. The result is permanent: it must not
    /// be passed to [`free`](Self::free) or [`merge`](Self::merge).
    ///
    /// # Panics
    ///
    /// Panics if `align` or `span` is enabled but not a power of two. Dumps
    /// the directory and panics if the underlying allocation fails.
    #[track_caller]
    pub fn span_allocate(&self, size: usize, align: usize, span: usize) -> NonNull<u8> {
        assert!(
            align <= 1 || align.is_power_of_two(),
            "alignment {align} is not a power of two"
        );
        assert!(
            span <= 2 || span.is_power_of_two(),
            "span {span:#x} is not a power of two"
        );

        let block = size
            .checked_add(align)
            .and_then(|s| s.checked_add(span))
            .and_then(|total| self.allocate(total));
        let Some(block) = block else {
            self.fatal(&SpanExhaustedSnafu { size, align, span }.build());
        };

        let a = block.addr().get();
        let mut v = a;
        if span > 2 {
            v = (a + span).align_down(span);
            let prefix = v - a;
            let suffix = a + span - v;
            unsafe {
                self.release_extent(self.map().virt_to_phys(a), prefix);
                self.release_extent(self.map().virt_to_phys(v + size + align), suffix);
            }
        }
        if align > 1 {
            v = (v + align).align_down(align);
        }

        log::trace!("span_allocate({size}, {align}, {span:#x}) = {v:#x}");
        // `v >= a`, and `a` came from a `NonNull`.
        unsafe { NonNull::new_unchecked(ptr::with_exposed_provenance_mut(v)) }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use crate::{
        NODE_CAPACITY,
        addr::PhysMap as _,
        allocator::tests::{assert_dump_before_panic, catch_fatal, ranges, with_test_allocator},
        header::{HEADER_SIZE, block_size},
    };

    #[test]
    fn test_span_result_stays_in_one_window() {
        with_test_allocator(0x4000, |allocator| {
            let p = allocator.span_allocate(100, 8, 0x1000);
            let pa = allocator.map().virt_to_phys(p.addr().get());
            assert_eq!(pa % 8, 0);
            assert_eq!(pa / 0x1000, (pa + 99) / 0x1000);
        });
    }

    #[test]
    fn test_span_slack_is_returned() {
        with_test_allocator(0x4000, |allocator| {
            let _p = allocator.span_allocate(104, 8, 0x1000);

            // Block starts at 0, payload at HEADER_SIZE, next boundary 0x1000.
            let block = block_size(104 + 8 + 0x1000).unwrap();
            let kept_end = 0x1000 + 104 + 8;
            // No rounding slack, so the suffix ends exactly where the block
            // ends and merges with the rest of the heap.
            assert_eq!(HEADER_SIZE + 104 + 8 + 0x1000, block);
            assert_eq!(ranges(allocator), [HEADER_SIZE..0x1000, kept_end..0x4000]);
            assert_eq!(allocator.free_bytes(), 0x4000 - block + 0x1000);
        });
    }

    #[test]
    fn test_small_span_keeps_whole_block() {
        with_test_allocator(0x1000, |allocator| {
            let p = allocator.span_allocate(100, 16, 0);
            let pa = allocator.map().virt_to_phys(p.addr().get());
            assert_eq!(pa % 16, 0);
            assert!(pa > HEADER_SIZE);
            assert_eq!(allocator.free_bytes(), 0x1000 - block_size(116).unwrap());
            assert_eq!(allocator.free_nodes(), NODE_CAPACITY - 1);
        });
    }

    #[test]
    fn test_no_alignment_requested() {
        with_test_allocator(0x1000, |allocator| {
            let p = allocator.span_allocate(32, 0, 0);
            assert_eq!(allocator.map().virt_to_phys(p.addr().get()), HEADER_SIZE);
        });
    }

    #[test]
    fn test_span_exhaustion_dumps_directory() {
        with_test_allocator(0x1000, |allocator| {
            let (message, records) = catch_fatal(|| {
                let _ = allocator.span_allocate(0x2000, 8, 0x1000);
            });
            assert!(
                message.contains("span allocation of 8192 bytes (align 8, span 0x1000)"),
                "{message}"
            );
            let dump = assert_dump_before_panic(&records, &message);
            assert!(dump.contains("0x00000000 0x00001000 4096"), "{dump}");
        });
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn test_span_must_be_power_of_two() {
        with_test_allocator(0x4000, |allocator| {
            let _ = allocator.span_allocate(16, 8, 0x300);
        });
    }
}
