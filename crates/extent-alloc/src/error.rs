//! Conditions the allocator cannot survive.
//!
//! A bad guard means something wrote over allocator bookkeeping in physical
//! memory; carrying on could hand the same bytes out twice. These errors are
//! therefore never returned to a caller. They are formatted into a panic
//! after the directory has been dumped (see [`ExtentAllocator`]).
//!
//! [`ExtentAllocator`]: crate::ExtentAllocator

use core::fmt;

use snafu::{GenerateImplicitData, Snafu};

use crate::header::GUARD;

/// Source location captured where a fatal error was raised.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FatalError {
    #[snafu(display(
        "{op}({addr:#x}): bad guard {found:#x}, expected {:#x} (at {location})",
        GUARD
    ))]
    BadGuard {
        op: &'static str,
        addr: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "span allocation of {size} bytes (align {align}, span {span:#x}) failed (at {location})"
    ))]
    SpanExhausted {
        size: usize,
        align: usize,
        span: usize,
        #[snafu(implicit)]
        location: Location,
    },
}
