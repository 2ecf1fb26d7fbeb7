//! # Clock
//!
//! The engine reads time through the [`Clock`] trait and never writes it.
//! Timestamps are [`Millis`]: a 32-bit millisecond counter that wraps after
//! roughly 49.7 days. All comparisons go through [`Millis::reached`] and
//! [`Millis::since`], which use wrapping subtraction, so deadlines armed just
//! before the wrap still expire correctly just after it.

use core::cell::Cell;
use core::fmt;

/// A point on the wrapping millisecond timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Millis(pub u32);

impl Millis {
    /// Timestamp `ms` milliseconds after `self`, wrapping at `u32::MAX`.
    #[inline]
    pub const fn offset(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_add(ms))
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    #[inline]
    pub const fn since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Whether `self` is at or past `deadline`.
    ///
    /// Valid as long as the two timestamps are less than 2^31 ms apart.
    #[inline]
    pub const fn reached(self, deadline: Millis) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) >= 0
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Monotonic millisecond time source.
pub trait Clock {
    fn now(&self) -> Millis;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Millis {
        (**self).now()
    }
}

/// A clock that only moves when told to. Used to drive task trees on the
/// host, in tests and in simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    pub const fn new(start: u32) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    /// Move time forward by `ms`, wrapping like the hardware counter.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis(self.now.get())
    }
}
