//! File Descriptor Table
//!
//! Maps per-process descriptor slots to shared open-file handles. A handle
//! (vnode + offset + flags) is shared by every slot that refers to it,
//! across processes after fork; its reference count always equals the
//! number of such slots.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

use super::{OpenFlags, Vfs, Vnode};
use crate::config::CONSOLE_DEVICE;
use crate::error::{ProcError, ProcResult};

/// Fd 0/1/2 are reserved for stdin/stdout/stderr.
pub const STDIN_FILENO: usize = 0;
pub const STDOUT_FILENO: usize = 1;
pub const STDERR_FILENO: usize = 2;

/// Shared per-open state.
pub struct FileHandle {
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    state: Mutex<HandleState>,
}

struct HandleState {
    offset: u64,
    refcount: usize,
}

/// One descriptor slot's reference to a [`FileHandle`].
///
/// Cloning takes another reference and dropping releases one, both under
/// the handle's own lock. The vnode is closed when the count reaches zero.
pub struct FileRef(Arc<FileHandle>);

impl FileRef {
    /// Wrap a freshly opened vnode in a handle with one reference.
    pub fn new(vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Self {
        FileRef(Arc::new(FileHandle {
            vnode,
            flags,
            state: Mutex::new(HandleState {
                offset: 0,
                refcount: 1,
            }),
        }))
    }

    pub fn flags(&self) -> OpenFlags {
        self.0.flags
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.0.vnode
    }

    pub fn offset(&self) -> u64 {
        self.0.state.lock().offset
    }

    pub fn set_offset(&self, offset: u64) {
        self.0.state.lock().offset = offset;
    }

    /// Number of descriptor slots referring to this handle.
    pub fn refcount(&self) -> usize {
        self.0.state.lock().refcount
    }

    /// Whether both references name the same handle.
    pub fn same_handle(&self, other: &FileRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Clone for FileRef {
    fn clone(&self) -> Self {
        self.0.state.lock().refcount += 1;
        FileRef(self.0.clone())
    }
}

impl Drop for FileRef {
    fn drop(&mut self) {
        let last = {
            let mut state = self.0.state.lock();
            state.refcount -= 1;
            state.refcount == 0
        };
        if last {
            log::trace!("[PROC] closing vnode {}", self.0.vnode.name());
            self.0.vnode.close();
        }
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("vnode", &self.0.vnode.name())
            .field("flags", &self.0.flags)
            .finish()
    }
}

/// Fixed-size per-process descriptor table.
#[derive(Debug)]
pub struct FileTable {
    slots: Vec<Option<FileRef>>,
}

impl FileTable {
    /// Create a table with `open_max` empty slots.
    pub fn new(open_max: usize) -> Self {
        let mut slots = Vec::with_capacity(open_max);
        slots.resize_with(open_max, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Install `file` in the lowest free slot and return its descriptor.
    pub fn install(&mut self, file: FileRef) -> ProcResult<usize> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ProcError::TooManyFiles)?;
        self.slots[fd] = Some(file);
        Ok(fd)
    }

    /// Install `file` at `fd`, closing whatever was there.
    pub fn install_at(&mut self, fd: usize, file: FileRef) -> ProcResult<()> {
        let slot = self.slots.get_mut(fd).ok_or(ProcError::BadDescriptor)?;
        *slot = Some(file);
        Ok(())
    }

    pub fn get(&self, fd: usize) -> Option<&FileRef> {
        self.slots.get(fd).and_then(Option::as_ref)
    }

    /// Release descriptor `fd`.
    pub fn close(&mut self, fd: usize) -> ProcResult<()> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .map(drop)
            .ok_or(ProcError::BadDescriptor)
    }

    /// Release every descriptor.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Copy of this table for a forked child: every open slot refers to the
    /// same handle at the same index.
    pub fn duplicate(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Open the console on descriptors 0, 1 and 2, each with its own handle.
    pub fn attach_console<V>(&mut self, vfs: &V) -> ProcResult<()>
    where
        V: Vfs + ?Sized,
    {
        let modes = [
            (STDIN_FILENO, OpenFlags::RDONLY),
            (STDOUT_FILENO, OpenFlags::WRONLY),
            (STDERR_FILENO, OpenFlags::WRONLY),
        ];
        for (fd, flags) in modes {
            let vnode = vfs.open(CONSOLE_DEVICE, flags)?;
            self.install_at(fd, FileRef::new(vnode, flags))?;
        }
        Ok(())
    }
}
