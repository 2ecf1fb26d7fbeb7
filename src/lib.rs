//! # tickflow: Cooperative Task Composition for Bare-Metal Loops
//!
//! A cooperative multitasking engine for single-threaded, interrupt-driven
//! control loops on ARM Cortex-M4 microcontrollers, with no operating
//! system and no preemption.
//!
//! ## Overview
//!
//! Firmware written as one `loop()` that runs forever usually ends up as a
//! tangle of flags and timestamps. tickflow lets each activity be written
//! as a blocking-looking task that is in fact resumed one step per tick:
//!
//! - **Tasks are values**: a struct holding the task's locals and an enum
//!   naming where it left off
//! - **Frames own sub-tasks**: every running task owns up to three
//!   children, destroyed the moment they are no longer needed
//! - **Operators compose**: sequence, delay, wait, timeout, join, race,
//!   turn-taking, producer/consumer and ramps decide each tick whether to
//!   suspend, finish or branch
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │               Host loop (firmware main)                │
//! ├────────────────────────────────────────────────────────┤
//! │            Scheduler Handle (scheduler.rs)             │
//! │          run_once() · run_repeat() · run_every()       │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Operators   │   Frame tree       │  Task model        │
//! │  ops.rs      │   frame.rs         │  task.rs           │
//! │  ─ delay     │   ─ step()         │  ─ RunStatus       │
//! │  ─ andthen   │   ─ slots          │  ─ Task · Progress │
//! │  ─ both/until│   ─ Context        │  ─ ready!          │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │       Clock (clock.rs) · Diagnostics (trace.rs)        │
//! ├────────────────────────────────────────────────────────┤
//! │   Kernel glue (kernel.rs) · Arch (arch/cortex_m4.rs)   │
//! │        SysTick millisecond clock · halt state          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **One allocation per Frame**: made fallibly; exhaustion halts the
//!   affected tree instead of continuing with a partial Frame
//! - **Fixed fan-out**: at most [`config::MAX_CHILDREN`] children per Frame
//! - **No shared ownership**: the Frame tree is a strict ownership tree;
//!   dropping a Frame drops its subtree
//! - **Critical sections**: only for the SysTick counter shared with its ISR

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod clock;
pub mod error;
pub mod task;
pub mod frame;
pub mod ops;
pub mod scheduler;
pub mod arch;
pub mod kernel;
pub mod sync;
mod trace;

pub use clock::{Clock, ManualClock, Millis};
pub use error::FrameError;
pub use frame::{Context, Frame, Slot};
pub use ops::{Outcome, Winner};
pub use scheduler::Scheduler;
pub use task::{from_fn, Progress, RunStatus, Step, Task, Value};
