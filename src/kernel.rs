//! # Kernel
//!
//! Firmware-facing glue: starts the millisecond clock and provides the
//! halted state the host loop enters when a task tree fails.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► heap init              ← global allocator for Frames
//!         ├─► kernel::init()         ← SysTick at TICK_HZ, lowest priority
//!         └─► loop                   ← host loop, never returns
//!               ├─► scheduler_a.run_*(&clock, ..)
//!               ├─► scheduler_b.run_*(&clock, ..)
//!               └─► kernel::or_halt(result) on each
//! ```

use log::error;

use cortex_m::peripheral::{SCB, SYST};

use crate::arch::cortex_m4;
use crate::clock::{Clock, Millis};
use crate::error::FrameError;
use crate::task::RunStatus;

/// The SysTick-driven millisecond clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    #[inline]
    fn now(&self) -> Millis {
        Millis(cortex_m4::millis())
    }
}

/// Start the millisecond clock.
///
/// Must be called once, from the main thread, before the host loop.
pub fn init(syst: &mut SYST, scb: &mut SCB) -> SysTickClock {
    cortex_m4::configure_systick(syst);
    cortex_m4::set_interrupt_priorities(scb);
    SysTickClock
}

/// Unwrap a driver result, halting the processor on error.
///
/// A failed tree cannot be recovered mid-tick; the whole program stops.
pub fn or_halt(result: Result<RunStatus, FrameError>) -> RunStatus {
    match result {
        Ok(status) => status,
        Err(err) => halt(err),
    }
}

/// Log `err` and stop the processor.
pub fn halt(err: FrameError) -> ! {
    error!("halting: {}", err);
    cortex_m4::halt()
}
