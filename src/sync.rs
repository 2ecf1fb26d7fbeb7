//! # Synchronization Primitives
//!
//! The task engine itself is single-threaded and needs no locking. The only
//! state shared with interrupt handlers is the SysTick millisecond counter
//! (and whatever the application chooses to share, such as the demo's LED
//! level). Such state lives in a [`Shared`] cell, read and written inside a
//! critical section.

use core::cell::Cell;

use cortex_m::interrupt::{self, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit. Keep the closure
/// short: it delays every interrupt, including SysTick.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// A `Copy` value shared between the host loop and interrupt handlers.
pub struct Shared<T> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        critical_section(|cs| self.inner.borrow(cs).get())
    }

    pub fn set(&self, value: T) {
        critical_section(|cs| self.inner.borrow(cs).set(value));
    }

    /// Replace the value with `f(value)` atomically and return the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        critical_section(|cs| {
            let cell = self.inner.borrow(cs);
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }
}
