//! fork
//!
//! The child is assembled completely (PID, address space copy, shared
//! descriptors, resume frame) before it is published in the process table,
//! and every step before publication unwinds by dropping what it built.

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;

use super::context::TrapFrame;
use super::manager::ProcessManager;
use super::table::{Pid, Process};
use crate::error::{ProcError, ProcResult};
use crate::scheduler::ThreadEntry;
use crate::Platform;

/// First code a forked child runs in the kernel: switch to its own address
/// space and return to user mode where the parent trapped.
fn child_entry(platform: &dyn Platform, child: &Process, frame: TrapFrame) -> ! {
    let activated = child.with_space(|space| {
        space.activate();
        Ok(())
    });
    if activated.is_err() {
        log::warn!("[PROC] PID {} has no address space to resume in", child.pid());
        platform.exit_thread();
    }
    platform.enter_user_mode(frame)
}

impl ProcessManager {
    /// Duplicate `caller` into a new child.
    ///
    /// `frame` is the caller's register state at the system call. The child
    /// resumes from a copy of it returning 0; the caller gets the child's
    /// PID. On failure nothing of the child remains.
    pub fn fork(&self, caller: Pid, frame: &TrapFrame) -> ProcResult<Pid> {
        let parent = self.table.lookup(caller).ok_or(ProcError::UnknownPid)?;

        let reservation = self.table.reserve()?;
        let pid = reservation.pid();

        let space = parent.with_space(|space| space.duplicate())?;
        let files = parent.files().duplicate();
        let child_frame = frame.for_fork_child();

        let child = Arc::new(Process::new(pid, caller, parent.name(), Some(space), files));
        reservation.commit(child.clone());

        let entry: ThreadEntry = {
            let child = child.clone();
            let platform = self.platform.clone();
            Box::new(move || {
                child_entry(&*platform, &child, child_frame);
            })
        };

        match self.platform.spawn_thread(&format!("pid {}", pid), entry) {
            Ok(tid) => {
                child.set_thread(tid);
                log::debug!("[PROC] PID {} forked PID {} (thread {})", caller, pid, tid);
                Ok(pid)
            }
            Err(err) => {
                log::warn!("[PROC] fork of PID {} failed to start a thread: {}", caller, err);
                self.table.remove(pid);
                Err(err)
            }
        }
    }
}
