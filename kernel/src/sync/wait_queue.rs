//! Wait queue
//!
//! A condition variable for `spin::Mutex`: threads sleep on a queue of
//! thread IDs and are released by [`WaitQueue::wake_all`]. Sleeping and
//! waking go through the [`Scheduler`], the same way a futex parks tasks.

use alloc::collections::VecDeque;
use spin::{Mutex, MutexGuard};

use crate::scheduler::{Scheduler, ThreadId};

/// Queue of threads waiting for a condition guarded by some other lock.
pub struct WaitQueue {
    waiters: Mutex<VecDeque<ThreadId>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Release `guard`, sleep until woken, then re-acquire `lock`.
    ///
    /// The caller is registered before `guard` is dropped, so a wake issued
    /// by a thread that takes `lock` afterwards cannot be missed. Returns on
    /// spurious wakeups too; callers re-check their condition in a loop.
    pub fn wait<'a, T, S>(
        &self,
        scheduler: &S,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> MutexGuard<'a, T>
    where
        S: Scheduler + ?Sized,
    {
        let me = scheduler.current_thread();
        self.waiters.lock().push_back(me);
        drop(guard);

        scheduler.block_current();

        // Woken or not, we are no longer a waiter once we look again.
        self.waiters.lock().retain(|tid| *tid != me);
        lock.lock()
    }

    /// Wake every waiting thread. Returns how many were woken.
    pub fn wake_all<S>(&self, scheduler: &S) -> usize
    where
        S: Scheduler + ?Sized,
    {
        let woken = core::mem::take(&mut *self.waiters.lock());
        for tid in &woken {
            scheduler.wake(*tid);
        }
        woken.len()
    }

    /// Number of threads currently queued.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
