//! Fixed-capacity pool of extent records.
//!
//! The directory needs one record per free extent, but the allocator cannot
//! allocate memory to describe memory. All records therefore live in one
//! array owned by the pool, and unused ones are tracked by a fixed stack of
//! free indices. Both acquire and release are O(1) and never allocate, and
//! the pool can be built in a `const` context.

use core::ops::{Index, IndexMut, Range};

/// A contiguous range of physical addresses `[base, end)`.
///
/// `end` is kept alongside `size` so that adjacency checks are plain integer
/// comparisons; `end == base + size` always holds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    base: usize,
    size: usize,
    end: usize,
}

impl Extent {
    /// Creates an extent starting at `base` spanning `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `base + size` overflows.
    #[must_use]
    pub const fn new(base: usize, size: usize) -> Self {
        let Some(end) = base.checked_add(size) else {
            panic!("extent overflows the address space");
        };
        Self { base, size, end }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.base..self.end
    }

    /// Extends the extent upwards by `size` bytes.
    pub(crate) fn grow_end(&mut self, size: usize) {
        self.size += size;
        self.end = self.base + self.size;
    }

    /// Extends the extent downwards by `size` bytes.
    pub(crate) fn grow_base(&mut self, size: usize) {
        self.base -= size;
        self.size += size;
    }

    /// Removes `size` bytes from the front and returns their base address.
    pub(crate) fn take_front(&mut self, size: usize) -> usize {
        assert!(size <= self.size);
        let base = self.base;
        self.base += size;
        self.size -= size;
        base
    }
}

/// Index of a record inside a [`NodePool`].
pub(crate) type NodeId = usize;

/// One slot of the pool: an extent and the link to the next slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    pub(crate) extent: Extent,
    /// Next record in the directory. Unused records keep `None` here.
    pub(crate) next: Option<NodeId>,
}

impl Node {
    const EMPTY: Self = Self {
        extent: Extent {
            base: 0,
            size: 0,
            end: 0,
        },
        next: None,
    };
}

/// Arena of `N` extent records plus a stack of the unused ones.
#[derive(Debug)]
pub(crate) struct NodePool<const N: usize> {
    nodes: [Node; N],
    /// `free[..available]` holds the unused indices; the top is handed out
    /// next.
    free: [NodeId; N],
    available: usize,
}

impl<const N: usize> NodePool<N> {
    /// Creates a pool with every record unused.
    ///
    /// Records are handed out in ascending index order.
    pub(crate) const fn new() -> Self {
        let mut free = [0; N];
        let mut i = 0;
        while i < N {
            free[i] = N - 1 - i;
            i += 1;
        }
        Self {
            nodes: [Node::EMPTY; N],
            free,
            available: N,
        }
    }

    /// Takes an unused record, or `None` if the pool is exhausted.
    pub(crate) fn acquire(&mut self) -> Option<NodeId> {
        self.available = self.available.checked_sub(1)?;
        Some(self.free[self.available])
    }

    /// Returns a record to the pool.
    pub(crate) fn release(&mut self, id: NodeId) {
        debug_assert!(
            !self.free[..self.available].contains(&id),
            "node {id} released twice"
        );
        self.nodes[id] = Node::EMPTY;
        self.free[self.available] = id;
        self.available += 1;
    }

    /// Number of records currently unused.
    pub(crate) fn available(&self) -> usize {
        self.available
    }
}

impl<const N: usize> Index<NodeId> for NodePool<N> {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id]
    }
}

impl<const N: usize> IndexMut<NodeId> for NodePool<N> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        &mut self.nodes[id]
    }
}
