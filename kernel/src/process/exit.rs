//! exit / waitpid
//!
//! `exit` publishes termination on the record and leaves it in the table
//! as a zombie; `waitpid` blocks the parent until that happens and then
//! reclaims the record. Exactly one caller ever reclaims a given record.

use alloc::sync::Arc;

use super::manager::ProcessManager;
use super::status::{ExitReason, WaitStatus};
use super::table::{Pid, Process, ProcessState};
use crate::error::{ProcError, ProcResult};
use crate::memory::uaccess::write_user_i32;

bitflags::bitflags! {
    /// `waitpid` options. None are supported; any set bit is rejected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitOptions: u32 {
        /// Return immediately if the child has not exited.
        const NOHANG = 1;
        /// Also report stopped children.
        const UNTRACED = 2;
    }
}

impl ProcessManager {
    /// Terminate `caller`.
    ///
    /// Closes its descriptors, hands its children to the root, then marks
    /// it `Exited` and wakes any waiting parent. The record (and the address
    /// space with it) stays until reclaimed. The calling thread must end
    /// afterwards; this does not return to the process.
    pub fn exit(&self, caller: Pid, reason: ExitReason) -> ProcResult<WaitStatus> {
        let process = self.table.lookup(caller).ok_or(ProcError::UnknownPid)?;

        process.files().close_all();

        let orphans = self.table.for_each_child_of(caller, |child, inner| {
            inner.parent = Pid::KERNEL;
            log::debug!("[PROC] PID {} reparented to PID {}", child.pid(), Pid::KERNEL);
        });

        let status = reason.encode();
        {
            let mut inner = process.lock();
            inner.state = ProcessState::Exited;
            inner.exit_status = Some(status);
            process.exited.wake_all(&*self.platform);
        }

        log::debug!(
            "[PROC] PID {} exited: {} ({} orphans)",
            caller,
            status,
            orphans
        );
        Ok(status)
    }

    /// Block until `target`, a child of `caller`, has exited and reclaim it.
    ///
    /// Returns the child's status. A second wait on the same PID fails with
    /// `UnknownPid`.
    pub fn wait_child(&self, caller: Pid, target: Pid) -> ProcResult<WaitStatus> {
        let child = self.check_wait(caller, target)?;

        let status = {
            let mut inner = child.lock();
            loop {
                if inner.parent != caller {
                    return Err(ProcError::NotAChild);
                }
                if inner.state == ProcessState::Exited {
                    break inner.exit_status;
                }
                inner = child.exited.wait(&*self.platform, &child.inner, inner);
            }
        };

        // Of several racing reclaimers only one finds the record. A loser
        // must not touch a newer process that has since taken the PID.
        let reclaimed = self
            .table
            .remove_if(target, &child)
            .ok_or(ProcError::UnknownPid)?;
        drop(reclaimed.take_space());
        log::debug!("[PROC] PID {} reclaimed by PID {}", target, caller);

        status.ok_or(ProcError::UnknownPid)
    }

    /// `waitpid(target, status_ptr, options)` for `caller`.
    ///
    /// With a null `status_ptr` the target is only checked, not waited for
    /// or reclaimed. A fault storing the status is reported after the
    /// child has been reclaimed.
    pub fn waitpid(
        &self,
        caller: Pid,
        target: Pid,
        status_ptr: u64,
        options: u32,
    ) -> ProcResult<Pid> {
        self.check_options(options)?;
        if status_ptr == 0 {
            self.check_wait(caller, target)?;
            return Ok(target);
        }

        let status = self.wait_child(caller, target)?;

        let waiter = self.table.lookup(caller).ok_or(ProcError::UnknownPid)?;
        waiter.with_space(|space| write_user_i32(space, status_ptr, status.raw()))?;
        Ok(target)
    }

    /// Reclaim every zombie whose parent is the root. Returns how many.
    pub fn reap_orphans(&self) -> usize {
        let reaped = self.table.remove_where(|_, inner| {
            inner.parent == Pid::KERNEL && inner.state == ProcessState::Exited
        });
        for process in &reaped {
            log::debug!("[PROC] PID {} reaped by root", process.pid());
        }
        reaped.len()
    }

    fn check_options(&self, options: u32) -> ProcResult<()> {
        match WaitOptions::from_bits(options) {
            Some(options) if options.is_empty() => Ok(()),
            _ => Err(ProcError::BadOptions),
        }
    }

    fn check_wait(&self, caller: Pid, target: Pid) -> ProcResult<Arc<Process>> {
        if target == caller {
            return Err(ProcError::SelfWait);
        }
        let child = self.table.lookup(target).ok_or(ProcError::UnknownPid)?;
        if child.parent() != caller {
            return Err(ProcError::NotAChild);
        }
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcConfig;
    use crate::process::TrapFrame;
    use crate::testing::HostPlatform;

    fn setup() -> (Arc<HostPlatform>, ProcessManager, Pid) {
        let platform = HostPlatform::new();
        platform.install_program("/init", 0x40_0000);
        let manager = ProcessManager::new(platform.clone(), ProcConfig::default());
        let (pid, _) = manager.run_program("/init", &["init"]).unwrap();
        (platform, manager, pid)
    }

    #[test]
    fn test_exit_then_wait() {
        let (_platform, manager, init) = setup();
        let child = manager.fork(init, &TrapFrame::new()).unwrap();

        let status = manager.exit(child, ExitReason::Exited(5)).unwrap();
        assert_eq!(manager.lookup(child).unwrap().state(), ProcessState::Exited);

        let waited = manager.wait_child(init, child).unwrap();
        assert_eq!(waited, status);
        assert_eq!(waited.exit_code(), Some(5));
        assert_eq!(manager.wait_child(init, child), Err(ProcError::UnknownPid));
    }

    #[test]
    fn test_exit_closes_descriptors() {
        let (platform, manager, init) = setup();
        let child = manager.fork(init, &TrapFrame::new()).unwrap();
        let parent = manager.lookup(init).unwrap();
        assert_eq!(parent.files().get(1).unwrap().refcount(), 2);

        manager.exit(child, ExitReason::Exited(0)).unwrap();
        assert_eq!(parent.files().get(1).unwrap().refcount(), 1);
        assert_eq!(manager.lookup(child).unwrap().files().open_count(), 0);

        manager.exit(init, ExitReason::Exited(0)).unwrap();
        assert_eq!(platform.console_open_count(), 0);
    }

    #[test]
    fn test_wait_relationship_errors() {
        let (_platform, manager, init) = setup();
        let child = manager.fork(init, &TrapFrame::new()).unwrap();
        let grandchild = manager.fork(child, &TrapFrame::new()).unwrap();

        assert_eq!(manager.wait_child(init, init), Err(ProcError::SelfWait));
        assert_eq!(manager.wait_child(init, grandchild), Err(ProcError::NotAChild));
        assert_eq!(manager.wait_child(init, Pid(999)), Err(ProcError::UnknownPid));
        assert_eq!(manager.waitpid(init, child, 0x1000, 1), Err(ProcError::BadOptions));
        assert_eq!(manager.waitpid(init, child, 0x1000, 0x80), Err(ProcError::BadOptions));
        // The target was not touched.
        assert_eq!(manager.lookup(child).unwrap().state(), ProcessState::Running);
    }

    #[test]
    fn test_null_status_does_not_reclaim() {
        let (_platform, manager, init) = setup();
        let child = manager.fork(init, &TrapFrame::new()).unwrap();

        assert_eq!(manager.waitpid(init, child, 0, 0), Ok(child));
        assert_eq!(manager.lookup(child).unwrap().state(), ProcessState::Running);

        manager.exit(child, ExitReason::Exited(1)).unwrap();
        assert_eq!(manager.waitpid(init, child, 0, 0), Ok(child));
        assert!(manager.lookup(child).is_some());
    }

    #[test]
    fn test_orphans_reparented_and_reaped() {
        let (_platform, manager, init) = setup();
        let parent = manager.fork(init, &TrapFrame::new()).unwrap();
        let orphan = manager.fork(parent, &TrapFrame::new()).unwrap();

        manager.exit(parent, ExitReason::Exited(0)).unwrap();
        assert_eq!(manager.getppid(orphan), Ok(Pid::KERNEL));
        assert_eq!(manager.wait_child(init, orphan), Err(ProcError::NotAChild));

        // The orphan has no children to hand over; its exit still works.
        manager.exit(orphan, ExitReason::Exited(3)).unwrap();
        assert_eq!(manager.reap_orphans(), 1);
        assert!(manager.lookup(orphan).is_none());
        // The exited parent still belongs to init.
        assert!(manager.lookup(parent).is_some());
    }

    #[test]
    fn test_root_waits_for_orphan() {
        let (_platform, manager, init) = setup();
        let parent = manager.fork(init, &TrapFrame::new()).unwrap();
        let orphan = manager.fork(parent, &TrapFrame::new()).unwrap();
        manager.exit(parent, ExitReason::Exited(0)).unwrap();
        manager.exit(orphan, ExitReason::Signaled(11)).unwrap();

        let status = manager.wait_child(Pid::KERNEL, orphan).unwrap();
        assert_eq!(status.term_sig(), Some(11));
        assert_eq!(manager.reap_orphans(), 0);
    }

    #[test]
    fn test_late_waiter_leaves_reused_pid_alone() {
        let platform = HostPlatform::new();
        platform.install_program("/init", 0x40_0000);
        let manager = Arc::new(ProcessManager::new(platform.clone(), ProcConfig::default()));
        let (init, _) = manager.run_program("/init", &["init"]).unwrap();

        let parent = manager.fork(init, &TrapFrame::new()).unwrap();
        let orphan = manager.fork(parent, &TrapFrame::new()).unwrap();
        manager.exit(parent, ExitReason::Exited(0)).unwrap();
        let record = manager.lookup(orphan).unwrap();

        let waiter = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.wait_child(Pid::KERNEL, orphan))
        };
        while record.exited.waiter_count() == 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        // Publish the exit, let the root reclaim the zombie and hand its PID
        // to a new child, all before the woken waiter gets the record lock.
        let fresh = {
            let mut inner = record.lock();
            inner.state = ProcessState::Exited;
            inner.exit_status = Some(ExitReason::Exited(4).encode());
            record.exited.wake_all(&*platform);

            assert!(manager.table.remove(orphan).is_some());
            manager.fork(init, &TrapFrame::new()).unwrap()
        };
        assert_eq!(fresh, orphan);

        assert_eq!(waiter.join().unwrap(), Err(ProcError::UnknownPid));
        let current = manager.lookup(fresh).unwrap();
        assert!(!Arc::ptr_eq(&current, &record));
        assert_eq!(current.state(), ProcessState::Running);
    }

    #[test]
    fn test_reclaim_drops_address_space() {
        let (platform, manager, init) = setup();
        let before = platform.live_spaces();
        let child = manager.fork(init, &TrapFrame::new()).unwrap();
        assert_eq!(platform.live_spaces(), before + 1);

        manager.exit(child, ExitReason::Exited(0)).unwrap();
        manager.wait_child(init, child).unwrap();
        assert_eq!(platform.live_spaces(), before);
    }
}
