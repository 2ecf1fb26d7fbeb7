//! # Diagnostics
//!
//! Operator entry/exit events, emitted as `(event, task, position)` through
//! the `log` facade under the `tickflow::trace` target. Without the
//! `diagnostics` feature the macros expand to nothing and their arguments
//! are never evaluated.
//!
//! Logging cannot fail into the scheduler: `log` drops records when no
//! logger is installed or the level is filtered.

/// Record one diagnostic event.
macro_rules! trace_event {
    ($event:expr, $task:expr, $position:expr) => {
        #[cfg(feature = "diagnostics")]
        {
            ::log::trace!(
                target: "tickflow::trace",
                "{} in {} at {}",
                $event,
                $task,
                $position
            );
        }
    };
}

/// Record an operator event at the caller's source location. Only
/// meaningful inside a `#[track_caller]` operator.
macro_rules! trace_op {
    ($event:expr, $task:expr) => {
        $crate::trace::trace_event!($event, $task, ::core::panic::Location::caller())
    };
}

pub(crate) use trace_event;
pub(crate) use trace_op;
