//! # Frame
//!
//! A Frame is one in-progress invocation of a task. It owns the task body
//! (locals and resume point), the bookkeeping the composition operators need
//! between ticks, and up to [`MAX_CHILDREN`] child Frames.
//!
//! ## Ownership
//!
//! ```text
//!                 Scheduler
//!                     │ root
//!                  ┌──▼──┐
//!                  │Frame│  state: slots · deadline · turn · hand-off
//!                  └┬─┬─┬┘  body:  user task struct
//!          First ┌──┘ │ └──┐ Third
//!             ┌──▼──┐ │ ┌──▼──┐
//!             │Frame│ │ │Frame│
//!             └─────┘ │ └─────┘
//!                  ┌──▼──┐ Second
//!                  │Frame│
//!                  └─────┘
//! ```
//!
//! Every child is exclusively owned by one slot. Clearing a slot, finishing a
//! Frame, or dropping the root destroys the whole subtree depth-first: a
//! Frame's slots are dropped before its body.
//!
//! ## Allocation
//!
//! A Frame is a single heap allocation holding both bookkeeping and body.
//! The allocation is fallible: running out of memory yields
//! [`FrameError::OutOfMemory`] instead of aborting, and the owning
//! scheduler halts the tree.

use alloc::boxed::Box;
use core::alloc::Layout;
use core::fmt;
use core::panic::Location;

use crate::clock::{Clock, Millis};
use crate::config::MAX_CHILDREN;
use crate::error::FrameError;
use crate::task::{RunStatus, Step, Task, Value};
use crate::trace::trace_event;

// ---------------------------------------------------------------------------
// Child slots
// ---------------------------------------------------------------------------

/// Index of a child slot. There are exactly [`MAX_CHILDREN`] of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First = 0,
    Second = 1,
    Third = 2,
}

impl Slot {
    pub const ALL: [Slot; MAX_CHILDREN] = [Slot::First, Slot::Second, Slot::Third];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Per-frame bookkeeping
// ---------------------------------------------------------------------------

/// Source location of an operator call. Identifies which operator a piece
/// of bookkeeping belongs to.
pub(crate) type Site = &'static Location<'static>;

/// A ramp in progress.
#[derive(Clone, Copy)]
pub(crate) struct Ramp {
    pub(crate) site: Site,
    pub(crate) start: Millis,

    /// First operator the ramp's loop body arms, learned on the first pass.
    pub(crate) body: Option<Site>,

    /// Whether the body has armed an operator since the ramp last produced
    /// a value.
    pub(crate) in_body: bool,
}

pub(crate) struct FrameState {
    children: [Option<Frame>; MAX_CHILDREN],

    /// Operator that owns `deadline`, `turn`, `handoff` and the child slots
    /// it initialised. `None` when no operator is in progress.
    pub(crate) site: Option<Site>,

    /// Whether `site` was entered or resumed during the current step.
    pub(crate) touched: bool,

    /// Armed by `delay` and `for_at_most`.
    pub(crate) deadline: Option<Millis>,

    /// Whose turn it is inside `alternate`.
    pub(crate) turn: Slot,

    /// Value a child handed to its partner (or to a `for_every` consumer).
    pub(crate) handoff: Option<Value>,

    /// Armed by `ramp`. Lives alongside the operators of its loop body.
    pub(crate) ramp: Option<Ramp>,
    pub(crate) ramp_touched: bool,

    status: RunStatus,
    steps: u32,
    name: &'static str,
}

impl FrameState {
    fn new(name: &'static str) -> Self {
        Self {
            children: [None, None, None],
            site: None,
            touched: false,
            deadline: None,
            turn: Slot::First,
            handoff: None,
            ramp: None,
            ramp_touched: false,
            status: RunStatus::Idle,
            steps: 0,
            name,
        }
    }

    /// Claim the bookkeeping for the operator at `site`.
    ///
    /// Returns `true` when the operator is entering now, `false` when it is
    /// resuming. An operator still armed at a different site was left
    /// before it finished and is disarmed first.
    pub(crate) fn enter(&mut self, site: Site) -> bool {
        self.touched = true;
        if self.site == Some(site) {
            return false;
        }
        if self.site.is_some() {
            self.abandon();
        }
        self.site = Some(site);

        let strayed = match self.ramp.as_mut() {
            Some(ramp) if !ramp.in_body => {
                ramp.in_body = true;
                *ramp.body.get_or_insert(site) != site
            }
            _ => false,
        };
        if strayed {
            trace_event!("ramp left", self.name, site);
            self.ramp = None;
        }
        true
    }

    /// The operator in progress finished; forget its bookkeeping.
    pub(crate) fn leave(&mut self) {
        self.site = None;
        self.deadline = None;
        self.turn = Slot::First;
        self.handoff = None;
    }

    /// Disarm the operator in progress, destroying its children.
    pub(crate) fn abandon(&mut self) {
        if let Some(site) = self.site {
            trace_event!("left", self.name, site);
            if self.ramp.is_some_and(|ramp| ramp.body == Some(site)) {
                self.ramp = None;
            }
        }
        for slot in &mut self.children {
            *slot = None;
        }
        self.leave();
    }

    /// End-of-step check: an operator the body did not come back to has
    /// been left, and so has a ramp whose loop body is no longer running.
    fn settle(&mut self) {
        if self.site.is_some() && !self.touched {
            self.abandon();
        }
        if self.ramp.is_some() && !self.ramp_touched {
            let body_running = self.ramp.is_some_and(|ramp| ramp.in_body) && self.site.is_some();
            if !body_running {
                self.ramp = None;
            }
        }
        self.touched = false;
        self.ramp_touched = false;
    }

    /// Destroy every child subtree and disarm all operator bookkeeping.
    fn release(&mut self) {
        for slot in &mut self.children {
            *slot = None;
        }
        self.leave();
        self.touched = false;
        self.ramp = None;
        self.ramp_touched = false;
    }
}

struct Node<T: ?Sized> {
    // Declared before `body` so the subtree is dropped first.
    state: FrameState,
    body: T,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// The persistent, owned record of one in-progress task invocation.
pub struct Frame {
    node: Box<Node<dyn Task>>,
}

impl Frame {
    /// Allocate a Frame for `task`. Nothing runs until the first [`step`].
    ///
    /// [`step`]: Frame::step
    pub fn new<T: Task + 'static>(task: T) -> Result<Frame, FrameError> {
        let name = task.name();
        let node: Box<Node<T>> = try_box(Node {
            state: FrameState::new(name),
            body: task,
        })
        .ok_or(FrameError::OutOfMemory { task: name })?;
        let node: Box<Node<dyn Task>> = node;
        Ok(Frame { node })
    }

    /// Resume the task once.
    ///
    /// Returns `Suspended` or `Yielded` while the task has more to do and
    /// `Done` exactly once. A Frame that has reported `Done` releases its
    /// children and rejects further steps with [`FrameError::Finished`].
    pub fn step(&mut self, clock: &dyn Clock) -> Step {
        self.step_with(clock, None)
    }

    /// Step with access to the parent's hand-off slot.
    pub(crate) fn step_with(
        &mut self,
        clock: &dyn Clock,
        handoff: Option<&mut Option<Value>>,
    ) -> Step {
        let node = &mut *self.node;
        let state = &mut node.state;
        let name = state.name;

        if state.status.is_done() {
            return Err(FrameError::Finished { task: name });
        }
        if state.status == RunStatus::Idle {
            trace_event!("begin", name, state.steps);
        }
        state.steps = state.steps.wrapping_add(1);

        let status = {
            let mut cx = Context {
                clock,
                frame: &mut *state,
                handoff,
            };
            node.body.step(&mut cx)?
        };
        debug_assert!(status != RunStatus::Idle, "`{}` reported Idle", name);

        state.status = status;
        if status.is_done() {
            trace_event!("end", name, state.steps);
            state.release();
        } else {
            state.settle();
        }
        Ok(status)
    }

    /// Whether the task has reported `Done`.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.node.state.status.is_done()
    }

    /// Status reported by the most recent step (`Idle` before the first).
    #[inline]
    pub fn status(&self) -> RunStatus {
        self.node.state.status
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.node.state.name
    }

    /// Number of steps taken so far.
    #[inline]
    pub fn steps(&self) -> u32 {
        self.node.state.steps
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.node.state;
        f.debug_struct("Frame")
            .field("task", &state.name)
            .field("status", &state.status)
            .field("steps", &state.steps)
            .field(
                "children",
                &state.children.iter().filter(|c| c.is_some()).count(),
            )
            .finish()
    }
}

/// Box `value`, reporting allocation failure instead of aborting.
fn try_box<T>(value: T) -> Option<Box<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Some(Box::new(value));
    }
    // SAFETY: `layout` has a non-zero size.
    let raw = unsafe { alloc::alloc::alloc(layout) }.cast::<T>();
    if raw.is_null() {
        return None;
    }
    // SAFETY: `raw` is non-null, aligned and sized for `T` by the global
    // allocator, and uninitialised. After the write, ownership moves to the
    // Box, which frees it with the same layout.
    unsafe {
        raw.write(value);
        Some(Box::from_raw(raw))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What a task body sees while it is being stepped: the clock, its own
/// Frame's child slots and bookkeeping, and its parent's hand-off slot.
///
/// The composition operators are methods on `Context` (see [`crate::ops`]).
pub struct Context<'a> {
    pub(crate) clock: &'a dyn Clock,
    pub(crate) frame: &'a mut FrameState,
    pub(crate) handoff: Option<&'a mut Option<Value>>,
}

impl<'a> Context<'a> {
    /// Current time.
    #[inline]
    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    /// Name of the task being stepped.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.frame.name
    }

    /// Place `frame` in `slot`, destroying any previous occupant first.
    ///
    /// Slots are shared with the composition operators: entering an
    /// operator while another one is unfinished destroys every child.
    pub fn init(&mut self, slot: Slot, frame: Frame) {
        let cell = &mut self.frame.children[slot.index()];
        *cell = None;
        *cell = Some(frame);
    }

    /// Destroy the child in `slot`, if any, with its whole subtree.
    pub fn clear(&mut self, slot: Slot) {
        self.frame.children[slot.index()] = None;
    }

    /// Whether `slot` holds no child.
    #[inline]
    pub fn is_vacant(&self, slot: Slot) -> bool {
        self.frame.children[slot.index()].is_none()
    }

    /// Step the child in `slot` once.
    pub fn run_child(&mut self, slot: Slot) -> Step {
        let FrameState {
            children, handoff, ..
        } = &mut *self.frame;
        match children[slot.index()].as_mut() {
            Some(child) => child.step_with(self.clock, Some(handoff)),
            None => Err(FrameError::EmptySlot { slot }),
        }
    }

    /// Step the child in `slot` unless it already finished, in which case
    /// its `Done` is reported again without running it.
    pub(crate) fn run_unfinished(&mut self, slot: Slot) -> Step {
        match &self.frame.children[slot.index()] {
            Some(child) if child.is_finished() => Ok(RunStatus::Done),
            _ => self.run_child(slot),
        }
    }

    /// Destroy all children and disarm every operator.
    pub(crate) fn release(&mut self) {
        self.frame.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    /// Suspends `left` times, then finishes. Records its drop.
    struct Countdown {
        tag: &'static str,
        left: u32,
        log: Log,
    }

    impl Task for Countdown {
        fn step(&mut self, _cx: &mut Context<'_>) -> Step {
            if self.left == 0 {
                return Ok(RunStatus::Done);
            }
            self.left -= 1;
            Ok(RunStatus::Suspended)
        }

        fn name(&self) -> &'static str {
            self.tag
        }
    }

    impl Drop for Countdown {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.tag);
        }
    }

    /// Installs two grandchildren on first step and never finishes.
    struct Parent {
        log: Log,
        armed: bool,
    }

    impl Task for Parent {
        fn step(&mut self, cx: &mut Context<'_>) -> Step {
            if !self.armed {
                self.armed = true;
                for (slot, tag) in [(Slot::First, "a"), (Slot::Second, "b")] {
                    let child = Frame::new(Countdown {
                        tag,
                        left: 10,
                        log: self.log.clone(),
                    })?;
                    cx.init(slot, child);
                }
            }
            cx.run_child(Slot::First)?;
            cx.run_child(Slot::Second)?;
            Ok(RunStatus::Suspended)
        }
    }

    impl Drop for Parent {
        fn drop(&mut self) {
            self.log.borrow_mut().push("parent");
        }
    }

    fn countdown(tag: &'static str, left: u32, log: &Log) -> Countdown {
        Countdown {
            tag,
            left,
            log: log.clone(),
        }
    }

    #[test]
    fn test_frame_starts_idle() {
        let log = Log::default();
        let frame = Frame::new(countdown("idle", 1, &log)).unwrap();
        assert_eq!(frame.status(), RunStatus::Idle);
        assert_eq!(frame.steps(), 0);
        assert_eq!(frame.name(), "idle");
        assert!(!frame.is_finished());
    }

    #[test]
    fn test_step_until_done() {
        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut frame = Frame::new(countdown("c", 2, &log)).unwrap();

        assert_eq!(frame.step(&clock), Ok(RunStatus::Suspended));
        assert_eq!(frame.step(&clock), Ok(RunStatus::Suspended));
        assert_eq!(frame.step(&clock), Ok(RunStatus::Done));
        assert!(frame.is_finished());
        assert_eq!(frame.steps(), 3);
    }

    #[test]
    fn test_step_after_done_is_rejected() {
        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut frame = Frame::new(countdown("c", 0, &log)).unwrap();

        assert_eq!(frame.step(&clock), Ok(RunStatus::Done));
        assert_eq!(
            frame.step(&clock),
            Err(FrameError::Finished { task: "c" })
        );
        // The body was not run again.
        assert_eq!(frame.steps(), 1);
    }

    #[test]
    fn test_drop_destroys_children_before_body() {
        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut frame = Frame::new(Parent {
            log: log.clone(),
            armed: false,
        })
        .unwrap();

        frame.step(&clock).unwrap();
        assert!(log.borrow().is_empty());

        drop(frame);
        assert_eq!(*log.borrow(), ["a", "b", "parent"]);
    }

    #[test]
    fn test_init_replaces_previous_occupant() {
        struct Replacer {
            log: Log,
            round: u8,
        }

        impl Task for Replacer {
            fn step(&mut self, cx: &mut Context<'_>) -> Step {
                let tag = if self.round == 0 { "old" } else { "new" };
                cx.init(Slot::Third, Frame::new(countdown(tag, 5, &self.log))?);
                self.round += 1;
                Ok(RunStatus::Suspended)
            }
        }

        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut frame = Frame::new(Replacer {
            log: log.clone(),
            round: 0,
        })
        .unwrap();

        frame.step(&clock).unwrap();
        assert!(log.borrow().is_empty());
        frame.step(&clock).unwrap();
        assert_eq!(*log.borrow(), ["old"]);
    }

    #[test]
    fn test_run_child_on_empty_slot() {
        struct Careless;

        impl Task for Careless {
            fn step(&mut self, cx: &mut Context<'_>) -> Step {
                cx.run_child(Slot::Second)
            }
        }

        let clock = ManualClock::new(0);
        let mut frame = Frame::new(Careless).unwrap();
        assert_eq!(
            frame.step(&clock),
            Err(FrameError::EmptySlot { slot: Slot::Second })
        );
    }

    #[test]
    fn test_done_releases_children() {
        struct ShortLived {
            log: Log,
            armed: bool,
        }

        impl Task for ShortLived {
            fn step(&mut self, cx: &mut Context<'_>) -> Step {
                if !self.armed {
                    self.armed = true;
                    cx.init(Slot::First, Frame::new(countdown("kid", 9, &self.log))?);
                    return Ok(RunStatus::Suspended);
                }
                Ok(RunStatus::Done)
            }
        }

        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut frame = Frame::new(ShortLived {
            log: log.clone(),
            armed: false,
        })
        .unwrap();

        frame.step(&clock).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(frame.step(&clock), Ok(RunStatus::Done));
        assert_eq!(*log.borrow(), ["kid"]);
    }

    #[test]
    fn test_zero_sized_box() {
        struct Nothing;
        assert!(try_box(Nothing).is_some());
        assert_eq!(*try_box(41u32).unwrap() + 1, 42);
    }
}
