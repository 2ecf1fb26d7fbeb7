//! # Task Model
//!
//! Defines what a task is from the engine's point of view: a value that can
//! be stepped, reporting a [`RunStatus`] each time.
//!
//! ## Writing a task
//!
//! A task is a plain struct. Its fields are the task's persistent locals,
//! including a resume point: an enum naming where the body left off. The
//! [`Task::step`] method matches on the resume point, runs plain statements,
//! and invokes composition operators on the [`Context`]. Operators return a
//! [`Progress`]; the [`ready!`](crate::ready) macro turns `Pending` into an
//! immediate `Suspended` return, so the same arm is re-entered next tick.
//!
//! ```ignore
//! struct Blink { led: Led, at: At }
//! enum At { On, LitWait, DarkWait }
//!
//! impl Task for Blink {
//!     fn step(&mut self, cx: &mut Context<'_>) -> Step {
//!         loop {
//!             match self.at {
//!                 At::On => {
//!                     self.led.set(true);
//!                     self.at = At::LitWait;
//!                 }
//!                 At::LitWait => {
//!                     ready!(cx.delay(500));
//!                     self.led.set(false);
//!                     self.at = At::DarkWait;
//!                 }
//!                 At::DarkWait => {
//!                     ready!(cx.delay(500));
//!                     return Ok(RunStatus::Done);
//!                 }
//!             }
//!         }
//!     }
//! }
//! ```

use crate::error::FrameError;
use crate::frame::Context;

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Result of stepping a task once.
///
/// ```text
///   ┌──────┐  first step   ┌───────────┐   body ends   ┌──────┐
///   │ Idle │ ────────────► │ Suspended │ ────────────► │ Done │
///   └──────┘               └───────────┘               └──────┘
///                            │      ▲
///                 your_turn  ▼      │  partner yields back
///                          ┌─────────┐
///                          │ Yielded │
///                          └─────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// Never stepped. Only ever held by a Frame that has not run yet.
    #[default]
    Idle,
    /// Finished permanently.
    Done,
    /// Wants to be stepped again next tick at the same logical position.
    Suspended,
    /// Handed control to its turn-taking partner without finishing.
    Yielded,
}

impl RunStatus {
    #[inline]
    pub const fn is_done(self) -> bool {
        matches!(self, RunStatus::Done)
    }

    #[inline]
    pub const fn is_suspended(self) -> bool {
        matches!(self, RunStatus::Suspended)
    }

    #[inline]
    pub const fn is_yielded(self) -> bool {
        matches!(self, RunStatus::Yielded)
    }

    /// Suspended or yielded: the task still has work to do.
    #[inline]
    pub const fn not_done(self) -> bool {
        matches!(self, RunStatus::Suspended | RunStatus::Yielded)
    }
}

/// Outcome of one step of a task body.
pub type Step = Result<RunStatus, FrameError>;

/// Value passed between turn-taking tasks and produced by ramps.
pub type Value = i32;

// ---------------------------------------------------------------------------
// Operator progress
// ---------------------------------------------------------------------------

/// Result of invoking a composition operator during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a pending operator must suspend the task; use `ready!`"]
pub enum Progress<T> {
    /// The operator finished this tick; execution continues past it.
    Ready(T),
    /// The operator needs more ticks; the body must suspend.
    Pending,
}

impl<T> Progress<T> {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Progress::Ready(_))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Progress::Pending)
    }
}

/// Unwrap a ready [`Progress`], or suspend the enclosing task body.
///
/// Must be used inside a function returning [`Step`].
#[macro_export]
macro_rules! ready {
    ($e:expr $(,)?) => {
        match $e {
            $crate::task::Progress::Ready(value) => value,
            $crate::task::Progress::Pending => {
                return ::core::result::Result::Ok($crate::task::RunStatus::Suspended);
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Task trait
// ---------------------------------------------------------------------------

/// A routine executed incrementally by the engine.
///
/// `step` must return promptly: it never blocks, spins or sleeps, and it
/// must not report [`RunStatus::Idle`].
pub trait Task {
    fn step(&mut self, cx: &mut Context<'_>) -> Step;

    /// Name used in diagnostics and errors.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// A task whose body is a closure. Handy for leaf tasks that keep their
/// state in captured variables.
///
/// ```ignore
/// let mut presses = 0;
/// let counter = from_fn(move |_cx| {
///     presses += 1;
///     Ok(if presses == 3 { RunStatus::Done } else { RunStatus::Suspended })
/// })
/// .named("counter");
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Context<'_>) -> Step,
{
    FromFn { name: "from_fn", f }
}

/// Task returned by [`from_fn`].
pub struct FromFn<F> {
    name: &'static str,
    f: F,
}

impl<F> FromFn<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Task for FromFn<F>
where
    F: FnMut(&mut Context<'_>) -> Step,
{
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        (self.f)(cx)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(RunStatus::Done.is_done());
        assert!(!RunStatus::Done.not_done());

        assert!(RunStatus::Suspended.is_suspended());
        assert!(RunStatus::Suspended.not_done());

        assert!(RunStatus::Yielded.is_yielded());
        assert!(RunStatus::Yielded.not_done());

        assert!(!RunStatus::Idle.not_done());
        assert!(!RunStatus::Idle.is_done());
    }

    #[test]
    fn test_default_status_is_idle() {
        assert_eq!(RunStatus::default(), RunStatus::Idle);
    }

    #[test]
    fn test_ready_macro_suspends_on_pending() {
        fn body(progress: Progress<u8>, seen: &mut Option<u8>) -> Step {
            let value = crate::ready!(progress);
            *seen = Some(value);
            Ok(RunStatus::Done)
        }

        let mut seen = None;
        assert_eq!(body(Progress::Pending, &mut seen), Ok(RunStatus::Suspended));
        assert_eq!(seen, None);

        assert_eq!(body(Progress::Ready(7), &mut seen), Ok(RunStatus::Done));
        assert_eq!(seen, Some(7));
    }

    #[test]
    fn test_from_fn_names() {
        let task = from_fn(|_cx| Ok(RunStatus::Done));
        assert_eq!(task.name(), "from_fn");
        assert_eq!(task.named("blinker").name(), "blinker");
    }
}
