//! Execution units
//!
//! The process subsystem does not own a scheduler. It asks the kernel's
//! thread layer for new execution units, for the identity of the running
//! one, and for blocking and waking, all through [`Scheduler`].

use alloc::boxed::Box;
use core::fmt;

use crate::error::ProcResult;
use crate::process::context::TrapFrame;

/// Thread ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry function of a freshly spawned thread.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Thread services consumed by the process subsystem.
pub trait Scheduler {
    /// Identity of the calling thread.
    fn current_thread(&self) -> ThreadId;

    /// Start a new schedulable unit running `entry`.
    ///
    /// Fails with `OutOfMemory` when the thread or its stack cannot be
    /// allocated; `entry` is dropped unrun in that case.
    fn spawn_thread(&self, name: &str, entry: ThreadEntry) -> ProcResult<ThreadId>;

    /// Put the calling thread to sleep until [`Scheduler::wake`] targets it.
    ///
    /// A wake delivered between registering interest and calling this must
    /// make it return immediately. Spurious returns are allowed.
    fn block_current(&self);

    /// Make `thread` runnable again.
    fn wake(&self, thread: ThreadId);

    /// Terminate the calling thread.
    fn exit_thread(&self) -> !;

    /// Drop to user mode with the register state in `frame`, on the address
    /// space activated last by the calling thread.
    fn enter_user_mode(&self, frame: TrapFrame) -> !;
}
