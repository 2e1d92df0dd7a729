//! The free-extent directory.
//!
//! Free physical memory is described by a singly linked list of [`Extent`]
//! records kept in ascending address order. Records come from a fixed
//! [`pool`](crate::pool) of `N`, so the list never needs memory it does not
//! already own.
//!
//! # Coalescing
//!
//! Every insertion merges eagerly with its neighbours:
//!
//! - **Forward merge**: a record ending exactly at the new base grows to cover
//!   the new range. If the grown record now touches its successor, the
//!   successor is absorbed as well and its record returns to the pool.
//! - **Backward merge**: otherwise, the first record starting above the new
//!   base is extended downwards when the new range ends exactly at its base.
//!   This branch does not look at the predecessor again.
//! - Otherwise a fresh record is spliced in before the first record with a
//!   larger base.
//!
//! ```text
//! forward:   [h.base .. h.end)[base .. top)[c.base .. c.end)
//!            └──────────────── one record ─────────────────┘
//! backward:                   [base .. top)[h.base .. h.end)
//!                             └─────── one record ────────┘
//! ```
//!
//! Allocation walks the same list and carves from the front of the first
//! record that is large enough (first fit).

use core::iter;

use crate::pool::{Extent, NodeId, NodePool};

/// How an insertion was absorbed by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The range was empty; nothing changed.
    Empty,
    /// An existing record was extended upwards.
    MergedForward,
    /// An existing record was extended upwards and then absorbed its
    /// successor.
    MergedBoth,
    /// An existing record was extended downwards.
    MergedBackward,
    /// A new record was linked in.
    Inserted,
    /// The pool had no record left; the range is lost to the allocator.
    Leaked,
}

/// Sorted list of free extents backed by a pool of `N` records.
#[derive(Debug)]
pub struct Directory<const N: usize> {
    pool: NodePool<N>,
    head: Option<NodeId>,
}

impl<const N: usize> Default for Directory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Directory<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pool: NodePool::new(),
            head: None,
        }
    }

    /// Returns the range `[base, base + size)` to the directory.
    ///
    /// # Panics
    ///
    /// Panics if `base + size` overflows.
    pub fn insert(&mut self, base: usize, size: usize) -> InsertOutcome {
        if size == 0 {
            return InsertOutcome::Empty;
        }
        let top = base
            .checked_add(size)
            .unwrap_or_else(|| panic!("extent {base:#x}+{size:#x} overflows"));

        let mut prev = None;
        let mut cur = self.head;
        while let Some(id) = cur {
            let extent = self.pool[id].extent;
            if extent.end() == base {
                self.pool[id].extent.grow_end(size);
                return self.absorb_next(id);
            }
            if extent.base() > base {
                break;
            }
            prev = cur;
            cur = self.pool[id].next;
        }

        if let Some(id) = cur
            && top == self.pool[id].extent.base()
        {
            self.pool[id].extent.grow_base(size);
            return InsertOutcome::MergedBackward;
        }

        let Some(id) = self.pool.acquire() else {
            log::warn!("extent directory: no free holes, leaked {size} bytes at {base:#x}");
            return InsertOutcome::Leaked;
        };
        self.pool[id].extent = Extent::new(base, size);
        self.pool[id].next = cur;
        self.set_next(prev, Some(id));
        InsertOutcome::Inserted
    }

    /// Merges the successor of `id` into it if the two now touch.
    fn absorb_next(&mut self, id: NodeId) -> InsertOutcome {
        let Some(next) = self.pool[id].next else {
            return InsertOutcome::MergedForward;
        };
        let next_extent = self.pool[next].extent;
        if self.pool[id].extent.end() != next_extent.base() {
            return InsertOutcome::MergedForward;
        }
        self.pool[id].extent.grow_end(next_extent.size());
        self.pool[id].next = self.pool[next].next;
        self.pool.release(next);
        InsertOutcome::MergedBoth
    }

    /// Carves `size` bytes off the front of the first extent large enough to
    /// hold them and returns their base address.
    ///
    /// Leaves the directory untouched and returns `None` if no extent fits.
    pub fn take_first_fit(&mut self, size: usize) -> Option<usize> {
        let mut prev = None;
        let mut cur = self.head;
        while let Some(id) = cur {
            let next = self.pool[id].next;
            let extent = &mut self.pool[id].extent;
            if extent.size() >= size {
                let base = extent.take_front(size);
                if extent.size() == 0 {
                    self.set_next(prev, next);
                    self.pool.release(id);
                }
                return Some(base);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    fn set_next(&mut self, prev: Option<NodeId>, next: Option<NodeId>) {
        match prev {
            Some(prev) => self.pool[prev].next = next,
            None => self.head = next,
        }
    }

    /// Iterates over the free extents in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = Extent> + '_ {
        let mut cur = self.head;
        iter::from_fn(move || {
            let id = cur?;
            cur = self.pool[id].next;
            Some(self.pool[id].extent)
        })
    }

    /// Number of unused records left in the pool.
    #[must_use]
    pub fn free_nodes(&self) -> usize {
        self.pool.available()
    }

    /// Total number of bytes described by the directory.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.iter().map(|e| e.size()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;
    use core::ops::Range;

    use super::*;

    fn ranges<const N: usize>(dir: &Directory<N>) -> Vec<Range<usize>> {
        dir.iter().map(|e| e.range()).collect()
    }

    fn assert_well_formed<const N: usize>(dir: &Directory<N>) {
        let extents = dir.iter().collect::<Vec<_>>();
        for e in &extents {
            assert_eq!(e.end(), e.base() + e.size());
            assert!(e.size() > 0);
        }
        for pair in extents.windows(2) {
            assert!(pair[0].end() < pair[1].base(), "{pair:?} overlap or touch");
        }
        assert_eq!(dir.free_nodes() + extents.len(), N);
    }

    #[test]
    fn test_insert_empty_is_noop() {
        let mut dir = Directory::<4>::new();
        assert_eq!(dir.insert(0x1000, 0), InsertOutcome::Empty);
        assert!(dir.is_empty());
        assert_eq!(dir.free_nodes(), 4);
    }

    #[test]
    fn test_insert_disjoint_keeps_order() {
        let mut dir = Directory::<8>::new();
        assert_eq!(dir.insert(0x5000, 0x1000), InsertOutcome::Inserted);
        assert_eq!(dir.insert(0x1000, 0x1000), InsertOutcome::Inserted);
        assert_eq!(dir.insert(0x9000, 0x1000), InsertOutcome::Inserted);
        assert_eq!(dir.insert(0x3000, 0x1000), InsertOutcome::Inserted);
        assert_eq!(
            ranges(&dir),
            [0x1000..0x2000, 0x3000..0x4000, 0x5000..0x6000, 0x9000..0xa000]
        );
        assert_well_formed(&dir);
    }

    #[test]
    fn test_forward_merge() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x1000, 0x1000);
        assert_eq!(dir.insert(0x2000, 0x800), InsertOutcome::MergedForward);
        assert_eq!(ranges(&dir), [0x1000..0x2800]);
        assert_eq!(dir.free_nodes(), 3);
    }

    #[test]
    fn test_fill_gap_merges_both_sides() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x0, 0x1000);
        dir.insert(0x2000, 0x1000);
        assert_eq!(dir.insert(0x1000, 0x1000), InsertOutcome::MergedBoth);
        assert_eq!(ranges(&dir), [0x0..0x3000]);
        assert_eq!(dir.free_nodes(), 3);
        assert_well_formed(&dir);
    }

    #[test]
    fn test_backward_merge() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x2000, 0x1000);
        assert_eq!(dir.insert(0x1800, 0x800), InsertOutcome::MergedBackward);
        assert_eq!(ranges(&dir), [0x1800..0x3000]);
        assert_eq!(dir.free_nodes(), 3);
    }

    #[test]
    fn test_range_touching_both_sides_takes_forward_branch() {
        // Records below the new base are checked for `end == base` before the
        // walk stops, so the backward branch never sees a touching
        // predecessor.
        let mut dir = Directory::<4>::new();
        dir.insert(0x0, 0x1000);
        dir.insert(0x2000, 0x1000);
        assert_eq!(dir.insert(0x1800, 0x800), InsertOutcome::MergedBackward);
        assert_eq!(ranges(&dir), [0x0..0x1000, 0x1800..0x3000]);
        assert_eq!(dir.insert(0x1000, 0x800), InsertOutcome::MergedBoth);
        assert_eq!(ranges(&dir), [0x0..0x3000]);
    }

    #[test]
    fn test_exhausted_pool_leaks_extent() {
        let mut dir = Directory::<2>::new();
        dir.insert(0x1000, 0x100);
        dir.insert(0x3000, 0x100);
        assert_eq!(dir.insert(0x5000, 0x100), InsertOutcome::Leaked);
        assert_eq!(ranges(&dir), [0x1000..0x1100, 0x3000..0x3100]);

        // Merging still works without a spare record.
        assert_eq!(dir.insert(0x1100, 0x100), InsertOutcome::MergedForward);
        assert_eq!(dir.free_bytes(), 0x300);
    }

    #[test]
    fn test_take_first_fit() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x1000, 0x100);
        dir.insert(0x3000, 0x1000);
        assert_eq!(dir.take_first_fit(0x200), Some(0x3000));
        assert_eq!(dir.take_first_fit(0x80), Some(0x1000));
        assert_eq!(ranges(&dir), [0x1080..0x1100, 0x3200..0x4000]);
        assert_well_formed(&dir);
    }

    #[test]
    fn test_take_whole_extent_releases_record() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x1000, 0x100);
        dir.insert(0x3000, 0x100);
        assert_eq!(dir.take_first_fit(0x100), Some(0x1000));
        assert_eq!(ranges(&dir), [0x3000..0x3100]);
        assert_eq!(dir.free_nodes(), 3);
        assert_eq!(dir.take_first_fit(0x100), Some(0x3000));
        assert!(dir.is_empty());
        assert_eq!(dir.free_nodes(), 4);
    }

    #[test]
    fn test_take_too_large_changes_nothing() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x1000, 0x100);
        dir.insert(0x3000, 0x200);
        assert_eq!(dir.take_first_fit(0x201), None);
        assert_eq!(ranges(&dir), [0x1000..0x1100, 0x3000..0x3200]);
        assert_eq!(dir.free_nodes(), 2);
    }

    #[test]
    fn test_take_then_insert_restores_state() {
        let mut dir = Directory::<4>::new();
        dir.insert(0x1000, 0x100);
        dir.insert(0x3000, 0x200);
        let before = ranges(&dir);

        let base = dir.take_first_fit(0x180).unwrap();
        dir.insert(base, 0x180);
        assert_eq!(ranges(&dir), before);
        assert_eq!(dir.free_nodes(), 2);
    }

    #[test]
    fn test_random_frees_coalesce() {
        let mut dir = Directory::<64>::new();
        // Free 32 blocks of 0x40 bytes in a scrambled order.
        for i in 0..32_usize {
            let slot = (i * 13) % 32;
            dir.insert(slot * 0x40, 0x40);
            assert_well_formed(&dir);
        }
        assert_eq!(ranges(&dir), [0x0..0x800]);
        assert_eq!(dir.free_nodes(), 63);
    }
}
