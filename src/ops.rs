//! # Composition Operators
//!
//! The structured-concurrency building blocks, implemented as methods on
//! [`Context`]. Each operator is a small state machine over the current
//! Frame's child slots and bookkeeping:
//!
//! | Operator | Children | Bookkeeping | Ready when |
//! |----------|----------|-------------|------------|
//! | [`delay`](Context::delay) | - | `deadline` | deadline reached |
//! | [`wait_until`](Context::wait_until) | - | - | condition true |
//! | [`andthen`](Context::andthen) | First | - | child done |
//! | [`for_at_most`](Context::for_at_most) | First | `deadline` | child done or deadline reached |
//! | [`both`](Context::both) / [`all3`](Context::all3) | First..Third | - | every child done |
//! | [`until`](Context::until) | First, Second | - | either child done |
//! | [`alternate`](Context::alternate) | First, Second | `turn`, `handoff` | either child done |
//! | [`for_every`](Context::for_every) | First | `handoff` | producer done |
//! | [`ramp`](Context::ramp) | - | `ramp` | duration elapsed |
//!
//! ## Arming
//!
//! Every operator is identified by its call site (operators are
//! `#[track_caller]`). A call from the site that armed the Frame's
//! bookkeeping resumes that operator; a call from any other site enters a
//! new one, and whatever the previous operator left behind (children,
//! deadline, turn, hand-off) is destroyed first. An operator the body does
//! not come back to on the next step is disarmed at the end of that step.
//! Helpers that wrap an operator should themselves be `#[track_caller]`.
//!
//! A [`ramp`](Context::ramp) keeps its own start time while the operators
//! of its loop body run. It is recognised as left when the body arms a
//! different first operator than on its first pass, or when a step passes
//! with neither the ramp nor its body running.
//!
//! ## Ordering
//!
//! Multi-child operators step their children in declared order, once per
//! tick. Anything an earlier child writes is visible to a later child in
//! the same tick. Results are read before the children are destroyed.

use core::panic::Location;

use crate::clock::Millis;
use crate::error::FrameError;
use crate::frame::{Context, Frame, Ramp, Slot};
use crate::task::{Progress, RunStatus, Step, Task, Value};
use crate::trace::trace_op;

/// How a [`for_at_most`](Context::for_at_most) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child finished before the deadline.
    Completed,
    /// The deadline passed first; the child was cancelled.
    TimedOut,
}

impl Outcome {
    #[inline]
    pub fn timed_out(self) -> bool {
        self == Outcome::TimedOut
    }
}

/// Which child ended a two-child operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    First,
    Second,
}

type Flow<T> = Result<Progress<T>, FrameError>;

impl<'a> Context<'a> {
    /// Claim the Frame's bookkeeping for the calling operator. `true` when
    /// it is entering rather than resuming.
    #[track_caller]
    fn entering(&mut self) -> bool {
        self.frame.enter(Location::caller())
    }

    // -----------------------------------------------------------------------
    // Timing and conditions
    // -----------------------------------------------------------------------

    /// Suspend for `ms` milliseconds from the tick this delay is entered.
    #[track_caller]
    pub fn delay(&mut self, ms: u32) -> Progress<()> {
        let now = self.now();
        if self.entering() {
            trace_op!("delay", self.name());
            self.frame.deadline = Some(now.offset(ms));
        }
        if let Some(deadline) = self.frame.deadline {
            if !now.reached(deadline) {
                return Progress::Pending;
            }
        }
        self.frame.leave();
        Progress::Ready(())
    }

    /// Suspend until `cond` holds. The condition is re-evaluated by the body
    /// every tick; it must not step another task.
    #[track_caller]
    pub fn wait_until(&mut self, cond: bool) -> Progress<()> {
        if self.entering() {
            trace_op!("wait_until", self.name());
        }
        if !cond {
            return Progress::Pending;
        }
        self.frame.leave();
        Progress::Ready(())
    }

    /// Value between `start` and `end` proportional to the time elapsed
    /// since this ramp was entered, or `None` once more than `duration`
    /// milliseconds have passed.
    ///
    /// The body that consumes the value usually suspends (for example with
    /// a [`delay`](Context::delay)) and then returns to the ramp:
    ///
    /// ```ignore
    /// At::Fade => match cx.ramp(1000, 0, 255) {
    ///     Some(level) => { pwm.set(level); self.at = At::FadeHold; }
    ///     None => self.at = At::Lit,
    /// },
    /// At::FadeHold => { ready!(cx.delay(50)); self.at = At::Fade; }
    /// ```
    #[track_caller]
    pub fn ramp(&mut self, duration: u32, start: Value, end: Value) -> Option<Value> {
        let site = Location::caller();
        let now = self.now();
        self.frame.ramp_touched = true;

        let origin = match self.frame.ramp {
            Some(ramp) if ramp.site == site => ramp.start,
            _ => {
                trace_op!("ramp", self.name());
                self.frame.ramp = Some(Ramp {
                    site,
                    start: now,
                    body: None,
                    in_body: false,
                });
                now
            }
        };
        let elapsed = now.since(origin);
        if elapsed > duration {
            trace_op!("ramp exit", self.name());
            self.frame.ramp = None;
            return None;
        }
        if let Some(ramp) = self.frame.ramp.as_mut() {
            ramp.in_body = false;
        }
        Some(interpolate(elapsed, duration, start, end))
    }

    // -----------------------------------------------------------------------
    // Single child
    // -----------------------------------------------------------------------

    /// Run a child task to completion before continuing.
    #[track_caller]
    pub fn andthen<T: Task + 'static>(&mut self, make: impl FnOnce() -> T) -> Flow<()> {
        if self.entering() {
            trace_op!("andthen", self.name());
            self.init(Slot::First, Frame::new(make())?);
        }
        if self.run_child(Slot::First)?.not_done() {
            return Ok(Progress::Pending);
        }
        trace_op!("andthen exit", self.name());
        self.clear(Slot::First);
        self.frame.leave();
        Ok(Progress::Ready(()))
    }

    /// Alias of [`andthen`](Context::andthen).
    #[track_caller]
    #[inline]
    pub fn call<T: Task + 'static>(&mut self, make: impl FnOnce() -> T) -> Flow<()> {
        self.andthen(make)
    }

    /// Run a child for at most `ms` milliseconds.
    ///
    /// ```ignore
    /// if ready!(cx.for_at_most(5000, Press::new)?).timed_out() {
    ///     // nobody pressed the button
    /// }
    /// ```
    #[track_caller]
    pub fn for_at_most<T: Task + 'static>(
        &mut self,
        ms: u32,
        make: impl FnOnce() -> T,
    ) -> Flow<Outcome> {
        if self.entering() {
            trace_op!("for_at_most", self.name());
            self.init(Slot::First, Frame::new(make())?);
            self.frame.deadline = Some(self.now().offset(ms));
        }
        let status = self.run_child(Slot::First)?;
        let now = self.now();
        let expired = self
            .frame
            .deadline
            .map_or(true, |deadline: Millis| now.reached(deadline));
        if status.not_done() && !expired {
            return Ok(Progress::Pending);
        }

        trace_op!("for_at_most exit", self.name());
        self.clear(Slot::First);
        self.frame.leave();
        Ok(Progress::Ready(if status.is_done() {
            Outcome::Completed
        } else {
            Outcome::TimedOut
        }))
    }

    /// Drive a producer; each value it hands off with
    /// [`hand_off`](Context::hand_off) runs `consumer` once, in the same
    /// tick. Ready once the producer finishes.
    ///
    /// Only hand-offs count as items. A producer that gives up its turn with
    /// [`your_turn`](Context::your_turn) has nothing to consume; it is
    /// stepped again next tick like a suspended one.
    #[track_caller]
    pub fn for_every<T: Task + 'static>(
        &mut self,
        make: impl FnOnce() -> T,
        mut consumer: impl FnMut(Value),
    ) -> Flow<()> {
        if self.entering() {
            trace_op!("for_every", self.name());
            self.init(Slot::First, Frame::new(make())?);
            self.frame.handoff = None;
        }
        match self.run_child(Slot::First)? {
            RunStatus::Done => {
                trace_op!("for_every exit", self.name());
                self.clear(Slot::First);
                self.frame.leave();
                Ok(Progress::Ready(()))
            }
            RunStatus::Yielded => {
                if let Some(value) = self.frame.handoff.take() {
                    consumer(value);
                }
                Ok(Progress::Pending)
            }
            _ => Ok(Progress::Pending),
        }
    }

    // -----------------------------------------------------------------------
    // Several children
    // -----------------------------------------------------------------------

    /// Run two children side by side until both are done.
    #[track_caller]
    pub fn both<A, B>(&mut self, a: impl FnOnce() -> A, b: impl FnOnce() -> B) -> Flow<()>
    where
        A: Task + 'static,
        B: Task + 'static,
    {
        if self.entering() {
            trace_op!("both", self.name());
            self.init(Slot::First, Frame::new(a())?);
            self.init(Slot::Second, Frame::new(b())?);
        }
        self.join(&[Slot::First, Slot::Second])
    }

    /// Run three children side by side until all are done.
    #[track_caller]
    pub fn all3<A, B, C>(
        &mut self,
        a: impl FnOnce() -> A,
        b: impl FnOnce() -> B,
        c: impl FnOnce() -> C,
    ) -> Flow<()>
    where
        A: Task + 'static,
        B: Task + 'static,
        C: Task + 'static,
    {
        if self.entering() {
            trace_op!("all3", self.name());
            self.init(Slot::First, Frame::new(a())?);
            self.init(Slot::Second, Frame::new(b())?);
            self.init(Slot::Third, Frame::new(c())?);
        }
        self.join(&Slot::ALL)
    }

    /// Step every unfinished child in `slots` once; ready when all are done.
    fn join(&mut self, slots: &[Slot]) -> Flow<()> {
        let mut pending = false;
        for &slot in slots {
            pending |= self.run_unfinished(slot)?.not_done();
        }
        if pending {
            return Ok(Progress::Pending);
        }
        for &slot in slots {
            self.clear(slot);
        }
        self.frame.leave();
        Ok(Progress::Ready(()))
    }

    /// Run two children until either finishes, then cancel the other.
    /// When both finish in the same tick the first one wins.
    ///
    /// ```ignore
    /// match ready!(cx.until(Button::pressed, || Blink::fast(led))?) {
    ///     Winner::First => { /* pressed */ }
    ///     Winner::Second => { /* blinking ended first */ }
    /// }
    /// ```
    #[track_caller]
    pub fn until<A, B>(&mut self, a: impl FnOnce() -> A, b: impl FnOnce() -> B) -> Flow<Winner>
    where
        A: Task + 'static,
        B: Task + 'static,
    {
        if self.entering() {
            trace_op!("until", self.name());
            self.init(Slot::First, Frame::new(a())?);
            self.init(Slot::Second, Frame::new(b())?);
        }
        let first = self.run_child(Slot::First)?;
        let second = self.run_child(Slot::Second)?;
        if first.not_done() && second.not_done() {
            return Ok(Progress::Pending);
        }

        trace_op!("until exit", self.name());
        let winner = if first.is_done() {
            Winner::First
        } else {
            Winner::Second
        };
        self.clear(Slot::First);
        self.clear(Slot::Second);
        self.frame.leave();
        Ok(Progress::Ready(winner))
    }

    // -----------------------------------------------------------------------
    // Turn taking
    // -----------------------------------------------------------------------

    /// Take turns between two children, starting with `a`. A child gives the
    /// turn away with [`your_turn`](Context::your_turn) or
    /// [`hand_off`](Context::hand_off); the construct ends as soon as either
    /// child finishes, naming the one that did.
    #[track_caller]
    pub fn alternate<A, B>(&mut self, a: impl FnOnce() -> A, b: impl FnOnce() -> B) -> Flow<Winner>
    where
        A: Task + 'static,
        B: Task + 'static,
    {
        if self.entering() {
            trace_op!("alternate", self.name());
            self.init(Slot::First, Frame::new(a())?);
            self.init(Slot::Second, Frame::new(b())?);
            self.frame.turn = Slot::First;
            self.frame.handoff = None;
        }
        let turn = self.frame.turn;
        match self.run_child(turn)? {
            RunStatus::Done => {
                trace_op!("alternate exit", self.name());
                self.clear(Slot::First);
                self.clear(Slot::Second);
                self.frame.leave();
                Ok(Progress::Ready(pair_winner(turn)))
            }
            RunStatus::Yielded => {
                self.frame.turn = match turn {
                    Slot::First => Slot::Second,
                    _ => Slot::First,
                };
                Ok(Progress::Pending)
            }
            _ => Ok(Progress::Pending),
        }
    }

    /// Give the turn to the partner task. The caller must record where to
    /// resume before returning this.
    #[track_caller]
    pub fn your_turn(&mut self) -> Step {
        trace_op!("your_turn", self.name());
        Ok(RunStatus::Yielded)
    }

    /// Give the turn to the partner task along with `value`.
    #[track_caller]
    pub fn hand_off(&mut self, value: Value) -> Step {
        trace_op!("hand_off", self.name());
        if let Some(slot) = self.handoff.as_deref_mut() {
            *slot = Some(value);
        }
        Ok(RunStatus::Yielded)
    }

    /// Take the value the partner handed off, if any.
    pub fn received(&mut self) -> Option<Value> {
        self.handoff.as_deref_mut().and_then(Option::take)
    }

    // -----------------------------------------------------------------------
    // Early finish
    // -----------------------------------------------------------------------

    /// Finish the task now. Children are destroyed immediately and the
    /// parent sees `Done` through the normal path.
    ///
    /// ```ignore
    /// if self.retries == 0 {
    ///     return cx.finish();
    /// }
    /// ```
    #[track_caller]
    pub fn finish(&mut self) -> Step {
        trace_op!("finish", self.name());
        self.release();
        Ok(RunStatus::Done)
    }
}

/// Winner of a two-child operator whose child in `slot` finished.
fn pair_winner(slot: Slot) -> Winner {
    match slot {
        Slot::First => Winner::First,
        _ => Winner::Second,
    }
}

/// Linear map of `elapsed` in `0..=duration` onto `start..=end`.
fn interpolate(elapsed: u32, duration: u32, start: Value, end: Value) -> Value {
    if duration == 0 {
        return end;
    }
    let span = i128::from(end) - i128::from(start);
    let value = i128::from(start) + span * i128::from(elapsed) / i128::from(duration);
    let (low, high) = if start <= end { (start, end) } else { (end, start) };
    value.clamp(i128::from(low), i128::from(high)) as Value
}
