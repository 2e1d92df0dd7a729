//! Seeding the allocator from the platform's memory map.
//!
//! Bring-up code reports physical memory as `(base, pages)` regions plus a
//! budget of pages the kernel may keep for itself. Each region is clamped to
//! the remaining budget and to the part the [`PhysMap`] can reach, and what
//! is left is handed to the directory. Clamping never rejects a region.

use crate::{
    ExtentAllocator,
    addr::{Align as _, PhysMap},
};

/// Size of one page in region descriptors.
pub const PAGE_SIZE: usize = 4096;

/// A physical memory region reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub base: usize,
    pub pages: usize,
}

impl MemRegion {
    #[must_use]
    pub const fn new(base: usize, pages: usize) -> Self {
        Self { base, pages }
    }
}

/// Everything the allocator needs from bring-up.
#[derive(Debug, Clone, Copy)]
pub struct BootMemory<'a> {
    /// Regions in the order they should be consumed.
    pub regions: &'a [MemRegion],
    /// Total number of pages this allocator may take across all regions.
    pub page_budget: usize,
}

/// What [`ExtentAllocator::seed`] handed to the directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Bytes inserted into the directory.
    pub bytes: usize,
    /// Pages taken out of the budget.
    pub pages: usize,
    /// Regions that were shortened or skipped.
    pub truncated: usize,
}

impl<M, const N: usize> ExtentAllocator<M, N>
where
    M: PhysMap,
{
    /// Feeds the regions of `boot` into the directory and logs a summary.
    ///
    /// # Safety
    ///
    /// Every byte of every region must be unused RAM that the allocator may
    /// own for the rest of the system's lifetime.
    pub unsafe fn seed(&self, boot: &BootMemory<'_>) -> SeedReport {
        let mut budget = boot.page_budget;
        let mut report = SeedReport::default();

        for region in boot.regions {
            let reachable = self.map().addressable_len(region.base) / PAGE_SIZE;
            let pages = region.pages.min(budget).min(reachable);
            if pages < region.pages {
                log::debug!(
                    "seed: region {:#x} truncated from {} to {pages} pages",
                    region.base,
                    region.pages
                );
                report.truncated += 1;
            }
            if pages == 0 {
                continue;
            }

            // A region running off the top of the address space is cut at the
            // last page boundary so that `end` stays representable.
            let end = pages
                .checked_mul(PAGE_SIZE)
                .and_then(|len| region.base.checked_add(len))
                .unwrap_or_else(|| usize::MAX.align_down(PAGE_SIZE));
            let size = end.saturating_sub(region.base);
            unsafe {
                self.release_extent(region.base, size);
            }
            budget -= pages;
            report.bytes += size;
            report.pages += pages;
        }

        self.log_summary();
        report
    }
}
