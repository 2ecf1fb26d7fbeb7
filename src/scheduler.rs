//! # Scheduler
//!
//! A [`Scheduler`] owns the root Frame of one top-level task and drives it
//! from the host loop, once per tick. There is one `Scheduler` per
//! top-level invocation site; independent schedulers never interact.
//!
//! ## Drivers
//!
//! | Driver | On `Done` |
//! |--------|-----------|
//! | [`run_once`](Scheduler::run_once) | Tree destroyed; task never runs again |
//! | [`run_repeat`](Scheduler::run_repeat) | Tree destroyed; next tick starts a fresh task |
//! | [`run_every`](Scheduler::run_every) | Tree destroyed; fresh task once the next period starts |
//!
//! ## Root lifecycle
//!
//! ```text
//!   ┌────────┐   first tick   ┌──────┐    Done (once)    ┌──────────┐
//!   │ Vacant │ ─────────────► │ Live │ ────────────────► │ Complete │
//!   └────────┘                └──────┘                   └──────────┘
//!        ▲     Done (repeat,     │
//!        └────── every) ─────────┤
//!                                │ FrameError
//!                                ▼
//!                           ┌────────┐
//!                           │ Halted │ ── reset() ──► Vacant
//!                           └────────┘
//! ```
//!
//! A halted scheduler has already dropped its tree. It reports the same
//! error on every tick until [`reset`](Scheduler::reset).

use log::{debug, error};

use crate::clock::{Clock, Millis};
use crate::error::FrameError;
use crate::frame::Frame;
use crate::task::{RunStatus, Task};

enum Root {
    Vacant,
    Live(Frame),
    Complete,
    Halted(FrameError),
}

/// Owner and driver of one task tree.
pub struct Scheduler {
    root: Root,

    /// Earliest time `run_every` may start the next run.
    next_start: Option<Millis>,

    /// Number of root Frames created so far.
    runs: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            root: Root::Vacant,
            next_start: None,
            runs: 0,
        }
    }

    /// Run the task produced by `make` to completion, once.
    ///
    /// After the task finishes every later call returns `Done` without
    /// running anything.
    pub fn run_once<T, F>(&mut self, clock: &dyn Clock, make: F) -> Result<RunStatus, FrameError>
    where
        T: Task + 'static,
        F: FnOnce() -> T,
    {
        if matches!(self.root, Root::Complete) {
            return Ok(RunStatus::Done);
        }
        let status = self.drive(clock, make)?;
        if status.is_done() {
            debug!("task run {} complete", self.runs);
            self.root = Root::Complete;
        }
        Ok(status)
    }

    /// Run the task produced by `make` forever, starting a fresh instance on
    /// the tick after each one finishes.
    pub fn run_repeat<T, F>(&mut self, clock: &dyn Clock, make: F) -> Result<RunStatus, FrameError>
    where
        T: Task + 'static,
        F: FnOnce() -> T,
    {
        let status = self.drive(clock, make)?;
        if status.is_done() {
            self.teardown();
        }
        Ok(status)
    }

    /// Start a fresh instance of the task every `period` milliseconds.
    ///
    /// The first run starts immediately. A run that is still going when its
    /// next start time arrives is not interrupted; the next run starts once
    /// it has finished and the start time has passed. Runs missed by more
    /// than a whole period are skipped. A `period` of zero behaves like
    /// [`run_repeat`](Scheduler::run_repeat).
    pub fn run_every<T, F>(
        &mut self,
        clock: &dyn Clock,
        period: u32,
        make: F,
    ) -> Result<RunStatus, FrameError>
    where
        T: Task + 'static,
        F: FnOnce() -> T,
    {
        if period == 0 {
            return self.run_repeat(clock, make);
        }
        if matches!(self.root, Root::Vacant) {
            let now = clock.now();
            match self.next_start {
                None => self.next_start = Some(now.offset(period)),
                Some(next) if now.reached(next) => {
                    let mut following = next.offset(period);
                    if now.reached(following) {
                        debug!("periodic task overran; resynchronising at {}", now);
                        following = now.offset(period);
                    }
                    self.next_start = Some(following);
                }
                Some(_) => return Ok(RunStatus::Done),
            }
        }
        self.run_repeat(clock, make)
    }

    /// Destroy the tree and forget any completion or halt.
    pub fn reset(&mut self) {
        self.root = Root::Vacant;
        self.next_start = None;
    }

    /// Whether a root Frame currently exists.
    pub fn is_running(&self) -> bool {
        matches!(self.root, Root::Live(_))
    }

    /// The error that halted this scheduler, if any.
    pub fn fault(&self) -> Option<FrameError> {
        match self.root {
            Root::Halted(err) => Some(err),
            _ => None,
        }
    }

    /// Number of root Frames created so far.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Create the root if needed and step it once. Any error halts the tree.
    fn drive<T, F>(&mut self, clock: &dyn Clock, make: F) -> Result<RunStatus, FrameError>
    where
        T: Task + 'static,
        F: FnOnce() -> T,
    {
        if let Root::Halted(err) = self.root {
            return Err(err);
        }
        if !matches!(self.root, Root::Live(_)) {
            match Frame::new(make()) {
                Ok(frame) => {
                    self.runs = self.runs.wrapping_add(1);
                    debug!("task `{}` started (run {})", frame.name(), self.runs);
                    self.root = Root::Live(frame);
                }
                Err(err) => return Err(self.halt(err)),
            }
        }

        let result = match &mut self.root {
            Root::Live(frame) => frame.step(clock),
            _ => return Ok(RunStatus::Idle),
        };
        match result {
            // A yield with no partner to take the turn is just a suspension.
            Ok(RunStatus::Yielded) => Ok(RunStatus::Suspended),
            Ok(status) => Ok(status),
            Err(err) => Err(self.halt(err)),
        }
    }

    fn teardown(&mut self) {
        if let Root::Live(frame) = &self.root {
            debug!("task `{}` finished (run {})", frame.name(), self.runs);
        }
        self.root = Root::Vacant;
    }

    fn halt(&mut self, err: FrameError) -> FrameError {
        error!("task tree halted: {}", err);
        self.root = Root::Halted(err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::frame::Context;
    use crate::task::Step;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Finishes on its `len`-th step. Counts steps in a local and records the
    /// highest count it ever saw in `peak`.
    struct Counter {
        len: u32,
        seen: u32,
        peak: Rc<Cell<u32>>,
    }

    impl Task for Counter {
        fn step(&mut self, _cx: &mut Context<'_>) -> Step {
            self.seen += 1;
            self.peak.set(self.peak.get().max(self.seen));
            if self.seen == self.len {
                Ok(RunStatus::Done)
            } else {
                Ok(RunStatus::Suspended)
            }
        }
    }

    fn counter(len: u32, peak: &Rc<Cell<u32>>) -> Counter {
        Counter {
            len,
            seen: 0,
            peak: peak.clone(),
        }
    }

    /// Always fails with a Finished error, as if it stepped a dead child.
    struct Broken;

    impl Task for Broken {
        fn step(&mut self, _cx: &mut Context<'_>) -> Step {
            Err(FrameError::Finished { task: "ghost" })
        }
    }

    #[test]
    fn test_run_once_never_restarts() {
        let clock = ManualClock::new(0);
        let peak = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        let statuses: Vec<_> = (0..5)
            .map(|_| scheduler.run_once(&clock, || counter(2, &peak)).unwrap())
            .collect();

        assert_eq!(
            statuses,
            [
                RunStatus::Suspended,
                RunStatus::Done,
                RunStatus::Done,
                RunStatus::Done,
                RunStatus::Done,
            ]
        );
        assert_eq!(scheduler.runs(), 1);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_run_repeat_starts_fresh_locals() {
        let clock = ManualClock::new(0);
        let peak = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        for _ in 0..3 {
            scheduler.run_repeat(&clock, || counter(3, &peak)).unwrap();
        }
        assert_eq!(scheduler.runs(), 1);
        assert!(!scheduler.is_running());

        // The fourth tick creates a new root whose count restarts at one.
        assert_eq!(
            scheduler.run_repeat(&clock, || counter(3, &peak)),
            Ok(RunStatus::Suspended)
        );
        assert_eq!(scheduler.runs(), 2);
        assert_eq!(peak.get(), 3);
    }

    #[test]
    fn test_run_every_waits_for_period() {
        let clock = ManualClock::new(500);
        let peak = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        // First run starts at once and finishes on the second tick.
        assert_eq!(
            scheduler.run_every(&clock, 100, || counter(2, &peak)),
            Ok(RunStatus::Suspended)
        );
        clock.advance(10);
        assert_eq!(
            scheduler.run_every(&clock, 100, || counter(2, &peak)),
            Ok(RunStatus::Done)
        );

        // Torn down, but not restarted before t=600.
        clock.set(599);
        assert_eq!(
            scheduler.run_every(&clock, 100, || counter(2, &peak)),
            Ok(RunStatus::Done)
        );
        assert_eq!(scheduler.runs(), 1);
        assert!(!scheduler.is_running());

        clock.set(600);
        assert_eq!(
            scheduler.run_every(&clock, 100, || counter(2, &peak)),
            Ok(RunStatus::Suspended)
        );
        assert_eq!(scheduler.runs(), 2);
    }

    #[test]
    fn test_run_every_skips_missed_periods() {
        let clock = ManualClock::new(0);
        let peak = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        scheduler.run_every(&clock, 100, || counter(1, &peak)).unwrap();

        // Host stalled for several periods.
        clock.set(450);
        scheduler.run_every(&clock, 100, || counter(1, &peak)).unwrap();
        assert_eq!(scheduler.runs(), 2);

        clock.set(549);
        scheduler.run_every(&clock, 100, || counter(1, &peak)).unwrap();
        assert_eq!(scheduler.runs(), 2);

        clock.set(550);
        scheduler.run_every(&clock, 100, || counter(1, &peak)).unwrap();
        assert_eq!(scheduler.runs(), 3);
    }

    #[test]
    fn test_run_every_zero_period_repeats() {
        let clock = ManualClock::new(0);
        let peak = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        for _ in 0..3 {
            assert_eq!(
                scheduler.run_every(&clock, 0, || counter(1, &peak)),
                Ok(RunStatus::Done)
            );
        }
        assert_eq!(scheduler.runs(), 3);
        assert_eq!(scheduler.next_start, None);
    }

    #[test]
    fn test_error_halts_tree() {
        let clock = ManualClock::new(0);
        let mut scheduler = Scheduler::new();

        let err = FrameError::Finished { task: "ghost" };
        assert_eq!(scheduler.run_repeat(&clock, || Broken), Err(err));
        assert_eq!(scheduler.fault(), Some(err));
        assert!(!scheduler.is_running());

        // Still halted; the factory is not called again.
        assert_eq!(
            scheduler.run_repeat(&clock, || -> Broken { unreachable!() }),
            Err(err)
        );

        scheduler.reset();
        assert_eq!(scheduler.fault(), None);
    }

    #[test]
    fn test_root_yield_reports_suspended() {
        let clock = ManualClock::new(0);
        let mut scheduler = Scheduler::new();
        let status = scheduler.run_repeat(&clock, || {
            crate::task::from_fn(|cx| cx.your_turn())
        });
        assert_eq!(status, Ok(RunStatus::Suspended));
    }
}
