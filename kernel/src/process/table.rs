//! Process Table
//!
//! The registry of every live or zombie process, indexed by PID.
//!
//! Lock order: the registry lock is taken before any record's `inner`
//! lock, never after. Record locks are never nested.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::{Mutex, MutexGuard};

use super::status::WaitStatus;
use crate::config::PID_MIN;
use crate::error::{ProcError, ProcResult};
use crate::memory::AddressSpace;
use crate::scheduler::ThreadId;
use crate::sync::WaitQueue;
use crate::vfs::FileTable;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// Root/kernel process. Its own parent, and the parent of every orphan.
    pub const KERNEL: Pid = Pid(1);

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Registry slot of this PID.
    fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Terminated, waiting to be reclaimed (zombie).
    Exited,
}

/// Fields that change over a process's life, behind the record lock.
#[derive(Debug)]
pub struct ProcInner {
    pub parent: Pid,
    pub state: ProcessState,
    /// Valid once `state` is `Exited`.
    pub exit_status: Option<WaitStatus>,
}

/// A process record.
pub struct Process {
    pid: Pid,
    pub(crate) inner: Mutex<ProcInner>,
    /// Parents blocked in `waitpid` on this process.
    pub(crate) exited: WaitQueue,
    name: Mutex<String>,
    space: Mutex<Option<Box<dyn AddressSpace>>>,
    files: Mutex<FileTable>,
    thread: Mutex<Option<ThreadId>>,
}

impl Process {
    pub fn new(
        pid: Pid,
        parent: Pid,
        name: String,
        space: Option<Box<dyn AddressSpace>>,
        files: FileTable,
    ) -> Self {
        Self {
            pid,
            inner: Mutex::new(ProcInner {
                parent,
                state: ProcessState::Running,
                exit_status: None,
            }),
            exited: WaitQueue::new(),
            name: Mutex::new(name),
            space: Mutex::new(space),
            files: Mutex::new(files),
            thread: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Lock the mutable record fields.
    pub fn lock(&self) -> MutexGuard<'_, ProcInner> {
        self.inner.lock()
    }

    pub fn parent(&self) -> Pid {
        self.inner.lock().parent
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    pub fn exit_status(&self) -> Option<WaitStatus> {
        self.inner.lock().exit_status
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = name;
    }

    pub fn thread(&self) -> Option<ThreadId> {
        *self.thread.lock()
    }

    pub fn set_thread(&self, tid: ThreadId) {
        *self.thread.lock() = Some(tid);
    }

    pub fn has_address_space(&self) -> bool {
        self.space.lock().is_some()
    }

    /// Run `f` on this process's address space.
    ///
    /// Kernel-only processes have no user image; `BadAddress` then.
    pub fn with_space<R>(
        &self,
        f: impl FnOnce(&mut dyn AddressSpace) -> ProcResult<R>,
    ) -> ProcResult<R> {
        let mut space = self.space.lock();
        match space.as_mut() {
            Some(space) => f(&mut **space),
            None => Err(ProcError::BadAddress),
        }
    }

    /// Install `space` as the user image and activate it, returning the old
    /// one.
    pub fn replace_space(&self, space: Box<dyn AddressSpace>) -> Option<Box<dyn AddressSpace>> {
        let mut slot = self.space.lock();
        space.activate();
        slot.replace(space)
    }

    /// Detach the address space.
    pub fn take_space(&self) -> Option<Box<dyn AddressSpace>> {
        self.space.lock().take()
    }

    pub fn files(&self) -> MutexGuard<'_, FileTable> {
        self.files.lock()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &inner.parent)
            .field("state", &inner.state)
            .field("exit_status", &inner.exit_status)
            .finish()
    }
}

/// Lightweight snapshot of a process (for diagnostics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub parent: Pid,
    pub state: ProcessState,
    pub name: String,
}

enum Slot {
    Free,
    /// Claimed by a fork in progress; not visible to lookups.
    Reserved,
    Occupied(Arc<Process>),
}

/// Process registry: a fixed number of slots, slot `i` holding PID `i + 1`.
pub struct ProcessTable {
    slots: Mutex<Vec<Slot>>,
}

impl ProcessTable {
    /// Create a table for `capacity` processes, the root included.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots: Mutex::new(slots),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Install the root process at its fixed PID.
    pub fn install_root(&self, root: Arc<Process>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = Pid::KERNEL.slot().and_then(|i| slots.get_mut(i)) {
            *slot = Slot::Occupied(root);
        }
    }

    /// Claim the lowest free PID at or above `PID_MIN`.
    ///
    /// The PID stays invisible until [`PidReservation::commit`]; dropping
    /// the reservation frees it again.
    pub fn reserve(&self) -> ProcResult<PidReservation<'_>> {
        let mut slots = self.slots.lock();
        let first = Pid(PID_MIN).slot().unwrap_or(0);
        let index = slots
            .iter()
            .skip(first)
            .position(|slot| matches!(slot, Slot::Free))
            .map(|offset| first + offset)
            .ok_or(ProcError::ResourceExhausted)?;
        slots[index] = Slot::Reserved;

        Ok(PidReservation {
            table: self,
            pid: Pid(index as u32 + 1),
            committed: false,
        })
    }

    /// Insert a record under `pid` and return it.
    ///
    /// Fails with `ResourceExhausted` if no PID is free.
    pub fn allocate(&self, build: impl FnOnce(Pid) -> Process) -> ProcResult<Arc<Process>> {
        let reservation = self.reserve()?;
        let process = Arc::new(build(reservation.pid()));
        reservation.commit(process.clone());
        Ok(process)
    }

    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        let slots = self.slots.lock();
        match pid.slot().and_then(|i| slots.get(i)) {
            Some(Slot::Occupied(process)) => Some(process.clone()),
            _ => None,
        }
    }

    /// Unlink a record. Returns `None` if nothing was there, so of two
    /// racing removers exactly one gets the record.
    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        if pid == Pid::KERNEL {
            return None;
        }
        let mut slots = self.slots.lock();
        let slot = pid.slot().and_then(|i| slots.get_mut(i))?;
        match core::mem::replace(slot, Slot::Free) {
            Slot::Occupied(process) => Some(process),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Unlink `pid` only while its slot still holds `expected`.
    ///
    /// A reclaimer that slept on a record must use this: by the time it runs
    /// the record may be gone and the PID handed to a new process.
    pub fn remove_if(&self, pid: Pid, expected: &Arc<Process>) -> Option<Arc<Process>> {
        if pid == Pid::KERNEL {
            return None;
        }
        let mut slots = self.slots.lock();
        let slot = pid.slot().and_then(|i| slots.get_mut(i))?;
        if !matches!(&*slot, Slot::Occupied(process) if Arc::ptr_eq(process, expected)) {
            return None;
        }
        match core::mem::replace(slot, Slot::Free) {
            Slot::Occupied(process) => Some(process),
            _ => None,
        }
    }

    /// Call `f` for every process whose parent is `parent`, with that
    /// child's record lock held.
    ///
    /// The registry lock is held throughout, so no child can be added or
    /// reclaimed during the scan.
    pub fn for_each_child_of<F>(&self, parent: Pid, mut f: F) -> usize
    where
        F: FnMut(&Arc<Process>, &mut ProcInner),
    {
        let slots = self.slots.lock();
        let mut visited = 0;
        for slot in slots.iter() {
            let Slot::Occupied(process) = slot else {
                continue;
            };
            if process.pid == parent {
                continue;
            }
            let mut inner = process.inner.lock();
            if inner.parent == parent {
                f(process, &mut *inner);
                visited += 1;
            }
        }
        visited
    }

    /// Unlink every record `pred` selects and hand them back, so they are
    /// destroyed outside the registry lock. The root is never selected.
    pub fn remove_where<F>(&self, mut pred: F) -> Vec<Arc<Process>>
    where
        F: FnMut(&Process, &ProcInner) -> bool,
    {
        let mut slots = self.slots.lock();
        let mut removed = Vec::new();
        for slot in slots.iter_mut() {
            let selected = match &*slot {
                Slot::Occupied(process) if process.pid != Pid::KERNEL => {
                    let inner = process.inner.lock();
                    pred(process, &inner)
                }
                _ => false,
            };
            if selected {
                if let Slot::Occupied(process) = core::mem::replace(slot, Slot::Free) {
                    removed.push(process);
                }
            }
        }
        removed
    }

    /// Number of registered records (reservations excluded).
    pub fn count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }

    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let slots = self.slots.lock();
        slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(process) => {
                    let inner = process.inner.lock();
                    Some(ProcessSnapshot {
                        pid: process.pid,
                        parent: inner.parent,
                        state: inner.state,
                        name: process.name(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

/// A claimed, not yet visible PID.
pub struct PidReservation<'a> {
    table: &'a ProcessTable,
    pid: Pid,
    committed: bool,
}

impl PidReservation<'_> {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Publish `process` under the reserved PID.
    pub fn commit(mut self, process: Arc<Process>) {
        debug_assert_eq!(process.pid, self.pid);
        let mut slots = self.table.slots.lock();
        if let Some(slot) = self.pid.slot().and_then(|i| slots.get_mut(i)) {
            *slot = Slot::Occupied(process);
        }
        self.committed = true;
    }
}

impl Drop for PidReservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.table.slots.lock();
        if let Some(slot) = self.pid.slot().and_then(|i| slots.get_mut(i)) {
            *slot = Slot::Free;
        }
    }
}
