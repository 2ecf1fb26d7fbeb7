//! # Cortex-M4 Port Layer
//!
//! SysTick configuration, the SysTick handler that advances the millisecond
//! counter, and the halted state entered on fatal errors.
//!
//! ## Interrupt Priorities
//!
//! SysTick runs at the lowest priority (0xFF) so that application interrupt
//! handlers are never delayed by the clock. The counter only needs to
//! advance before the next host tick reads it.

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sync::Shared;

/// Milliseconds since `configure_systick`, wrapping at `u32::MAX`.
static MILLIS: Shared<u32> = Shared::new(0);

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
///
/// With the default `TICK_HZ` of 1000 every interrupt is one millisecond.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set SysTick to the lowest exception priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: lowering SysTick's priority cannot break a priority-based
    // critical section; nothing in this crate relies on SysTick preempting.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

/// Current value of the millisecond counter.
#[inline]
pub fn millis() -> u32 {
    MILLIS.get()
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: advances the millisecond counter.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn SysTick() {
    MILLIS.update(|ms| ms.wrapping_add(1000 / TICK_HZ));
}

// ---------------------------------------------------------------------------
// Halt
// ---------------------------------------------------------------------------

/// Stop doing work: mask interrupts and sleep forever.
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}
