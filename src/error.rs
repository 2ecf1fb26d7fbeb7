//! # Frame Errors
//!
//! Every failure the engine can detect is a local invariant violation at the
//! Frame/operator boundary. None of them is recoverable mid-tick: the error
//! travels up the tree with `?` and the [`Scheduler`](crate::scheduler::Scheduler)
//! that owns the root halts that tree.

use thiserror::Error;

use crate::frame::Slot;

/// Errors raised while creating or stepping Frames.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The allocator could not provide memory for a new Frame.
    #[error("out of memory creating frame for `{task}`")]
    OutOfMemory { task: &'static str },

    /// A Frame was stepped again after it reported `Done`.
    #[error("`{task}` stepped after it finished")]
    Finished { task: &'static str },

    /// An operator stepped a child slot that was never initialised.
    #[error("child slot {slot:?} is empty")]
    EmptySlot { slot: Slot },
}
