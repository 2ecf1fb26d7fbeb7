//! # tickflow Configuration
//!
//! Compile-time constants governing the task tree and the firmware glue.
//! All limits are fixed at compile time.

/// Maximum number of child Frames a single Frame may own at once.
/// Matches the widest operator (`all3`). Child slots are addressed by
/// [`Slot`](crate::frame::Slot), so a larger fan-out cannot be expressed.
pub const MAX_CHILDREN: usize = 3;

/// SysTick frequency in Hz. At 1 kHz one SysTick interrupt advances the
/// millisecond clock by exactly one.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Size of the firmware heap in bytes. Every live Frame costs one
/// allocation from this region, so it bounds the depth and width of all
/// task trees combined.
pub const HEAP_SIZE: usize = 16 * 1024;
