//! Allocation failure while building a task tree. Runs with a global
//! allocator that can be told to refuse requests made from the current
//! thread.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

use tickflow::{
    from_fn, ready, Context, Frame, FrameError, ManualClock, RunStatus, Scheduler, Step, Task,
};

thread_local! {
    static REFUSE: Cell<bool> = const { Cell::new(false) };
}

/// Forwards to the system allocator unless this thread is refusing.
struct Refusing;

unsafe impl GlobalAlloc for Refusing {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if REFUSE.try_with(Cell::get).unwrap_or(false) {
            return ptr::null_mut();
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: Refusing = Refusing;

/// Never finishes. Stands in for a factory that must not be called.
struct Parked;

impl Task for Parked {
    fn step(&mut self, _cx: &mut Context<'_>) -> Step {
        Ok(RunStatus::Suspended)
    }
}

/// Run `f` with every allocation on this thread failing.
fn refusing<R>(f: impl FnOnce() -> R) -> R {
    REFUSE.with(|refuse| refuse.set(true));
    let result = f();
    REFUSE.with(|refuse| refuse.set(false));
    result
}

#[test]
fn test_frame_new_reports_out_of_memory() {
    let task = from_fn(|_| Ok(RunStatus::Done)).named("leaf");
    let result = refusing(|| Frame::new(task).map(|_| ()));
    assert_eq!(result, Err(FrameError::OutOfMemory { task: "leaf" }));
}

#[test]
fn test_child_allocation_failure_halts_scheduler() {
    let clock = ManualClock::new(0);
    let mut scheduler = Scheduler::new();
    let expected = FrameError::OutOfMemory { task: "child" };

    let root = || {
        from_fn(|cx| {
            let entered = refusing(|| {
                cx.andthen(|| from_fn(|_| Ok(RunStatus::Done)).named("child"))
            });
            ready!(entered?);
            Ok(RunStatus::Done)
        })
        .named("root")
    };

    assert_eq!(scheduler.run_repeat(&clock, root), Err(expected));
    assert_eq!(scheduler.fault(), Some(expected));
    assert!(!scheduler.is_running());

    // Later ticks keep reporting the fault without building a new tree.
    for _ in 0..3 {
        assert_eq!(
            scheduler.run_repeat(&clock, || -> Parked { unreachable!() }),
            Err(expected)
        );
    }
    assert_eq!(scheduler.runs(), 1);

    scheduler.reset();
    assert_eq!(scheduler.fault(), None);
    assert_eq!(
        scheduler.run_repeat(&clock, || from_fn(|_| Ok(RunStatus::Done))),
        Ok(RunStatus::Done)
    );
}
