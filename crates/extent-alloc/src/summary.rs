//! Human-readable dump of the directory.

use core::fmt;

use crate::directory::Directory;

/// Snapshot view of a [`Directory`] for printing.
///
/// ```text
/// 126 holes free
/// 0x00000000 0x00001000 4096
/// 0x00002000 0x00010000 57344
/// 61440 bytes free
/// ```
pub struct Summary<'a, const N: usize> {
    directory: &'a Directory<N>,
}

impl<'a, const N: usize> Summary<'a, N> {
    #[must_use]
    pub fn new(directory: &'a Directory<N>) -> Self {
        Self { directory }
    }
}

impl<const N: usize> fmt::Display for Summary<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} holes free", self.directory.free_nodes())?;
        let mut total = 0_usize;
        for extent in self.directory.iter() {
            writeln!(
                f,
                "{:#010x} {:#010x} {}",
                extent.base(),
                extent.end(),
                extent.size()
            )?;
            total += extent.size();
        }
        write!(f, "{total} bytes free")
    }
}
