//! The lock-protected allocator front end.
//!
//! [`ExtentAllocator`] owns the free-extent [`Directory`] behind a spin lock
//! and a [`PhysMap`] used to reach headers in memory. Every directory
//! mutation happens with the lock held; zero-filling a fresh payload and all
//! header validation happen outside it.

use core::{fmt, ptr::NonNull};

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::{
    NODE_CAPACITY,
    addr::PhysMap,
    directory::{Directory, InsertOutcome},
    error::{BadGuardSnafu, FatalError},
    header::{self, HEADER_SIZE, Header},
    pool::Extent,
    summary::Summary,
};

/// Physical extent allocator with a fixed pool of `N` extent records.
///
/// Construct it once during bring-up, seed it with
/// [`seed`](Self::seed) or [`release_extent`](Self::release_extent), and share
/// it by reference (it is `Sync`) for the lifetime of the system.
pub struct ExtentAllocator<M, const N: usize = NODE_CAPACITY> {
    map: M,
    directory: Mutex<Directory<N>>,
}

impl<M, const N: usize> fmt::Debug for ExtentAllocator<M, N>
where
    M: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ExtentAllocator");
        d.field("map", &self.map);
        match self.directory.try_lock() {
            Some(directory) => d.field("directory", &*directory),
            None => d.field("directory", &"<locked>"),
        };
        d.finish()
    }
}

impl<M, const N: usize> ExtentAllocator<M, N>
where
    M: PhysMap,
{
    /// Creates an allocator with an empty directory.
    ///
    /// This is a `const fn`, so the allocator can live in a `static` and be
    /// seeded once memory is known.
    #[must_use]
    pub const fn new(map: M) -> Self {
        Self {
            map,
            directory: Mutex::new(Directory::new()),
        }
    }

    #[must_use]
    pub fn map(&self) -> &M {
        &self.map
    }

    /// Allocates `size` zero-filled bytes.
    ///
    /// Returns `None` if `size` is zero or no free extent is large enough.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_with(size, true)
    }

    /// Allocates `size` bytes, zero-filling them if `zero` is set.
    ///
    /// The first free extent (in address order) that can hold the block is
    /// used. A failed request leaves the allocator untouched.
    pub fn allocate_with(&self, size: usize, zero: bool) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let Some(block) = header::block_size(size) else {
            log::debug!("allocate({size}): request too large");
            return None;
        };

        let header_va = {
            let mut directory = self.directory.lock();
            let Some(base) = directory.take_first_fit(block) else {
                drop(directory);
                log::debug!("allocate({size}): no free extent of {block} bytes");
                return None;
            };
            let header_va = self.map.phys_to_virt(base);
            unsafe {
                Header::new(block).write(header_va);
            }
            header_va
        };

        let payload = Header::payload(header_va);
        if zero {
            unsafe {
                payload.as_ptr().write_bytes(0, block - HEADER_SIZE);
            }
        }
        Some(payload)
    }

    /// Returns an allocation to the directory.
    ///
    /// # Panics
    ///
    /// Dumps the directory and panics if the header in front of `payload`
    /// does not carry the guard value.
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by [`allocate`](Self::allocate) or
    /// [`allocate_with`](Self::allocate_with) on this allocator, and must not
    /// be accessed afterwards.
    #[track_caller]
    pub unsafe fn free(&self, payload: NonNull<u8>) {
        let header_va = Header::addr_of(payload);
        let header = unsafe { Header::read(header_va) };
        if !header.is_valid() {
            self.fatal(&Self::bad_guard("free", payload, header));
        }
        // Stale pointers to this block now fail the guard check.
        unsafe {
            Header {
                size: header.size,
                guard: 0,
            }
            .write(header_va);
        }
        let base = self.map.virt_to_phys(header_va);
        self.directory.lock().insert(base, header.size);
    }

    /// Fuses `b` into `a` if `b` starts exactly where `a` ends.
    ///
    /// On success `a` covers both blocks and `b` must not be used again; its
    /// guard is cleared so that freeing it is caught as corruption. Returns
    /// `false` and changes nothing if the blocks are not adjacent in that
    /// order.
    ///
    /// # Panics
    ///
    /// Dumps the directory and panics if either header is corrupted.
    ///
    /// # Safety
    ///
    /// Both pointers must be live allocations from this allocator, owned by
    /// the caller.
    #[track_caller]
    pub unsafe fn merge(&self, a: NonNull<u8>, b: NonNull<u8>) -> bool {
        let a_va = Header::addr_of(a);
        let b_va = Header::addr_of(b);
        let (a_header, b_header) = unsafe { (Header::read(a_va), Header::read(b_va)) };
        if !a_header.is_valid() {
            self.fatal(&Self::bad_guard("merge", a, a_header));
        }
        if !b_header.is_valid() {
            self.fatal(&Self::bad_guard("merge", b, b_header));
        }

        if a_va.checked_add(a_header.size) != Some(b_va) {
            return false;
        }
        unsafe {
            Header::new(a_header.size + b_header.size).write(a_va);
            Header {
                size: b_header.size,
                guard: 0,
            }
            .write(b_va);
        }
        true
    }

    /// Hands the physical range `[base, base + size)` to the directory.
    ///
    /// Used for seeding and for giving back slack. An empty range is ignored.
    ///
    /// # Safety
    ///
    /// The range must be mapped by the allocator's [`PhysMap`], writable, and
    /// not used by anything else, now or later.
    pub unsafe fn release_extent(&self, base: usize, size: usize) -> InsertOutcome {
        self.directory.lock().insert(base, size)
    }

    /// Number of unused extent records.
    #[must_use]
    pub fn free_nodes(&self) -> usize {
        self.directory.lock().free_nodes()
    }

    /// Total number of free bytes.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.directory.lock().free_bytes()
    }

    /// Copies the free extents out in ascending address order.
    #[must_use]
    pub fn extents(&self) -> ArrayVec<Extent, N> {
        self.directory.lock().iter().collect()
    }

    /// Writes the [`Summary`] of the directory to `w`.
    pub fn write_summary<W>(&self, w: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        write!(w, "{}", Summary::new(&self.directory.lock()))
    }

    /// Logs the [`Summary`] of the directory at info level.
    pub fn log_summary(&self) {
        log::info!("{}", Summary::new(&self.directory.lock()));
    }

    #[track_caller]
    fn bad_guard(op: &'static str, payload: NonNull<u8>, header: Header) -> FatalError {
        BadGuardSnafu {
            op,
            addr: payload.addr().get(),
            found: header.guard,
        }
        .build()
    }

    /// Dumps the directory and stops.
    #[cold]
    pub(crate) fn fatal(&self, err: &FatalError) -> ! {
        log::error!("{}", Summary::new(&self.directory.lock()));
        log::error!("{err}");
        panic!("extent allocator: {err}");
    }
}
