//! Virtual File System seam
//!
//! The file system and vnode layer live outside this crate. Processes only
//! need to open a path (the program image, the console) and to hold shared
//! [`fd::FileRef`] handles to the resulting vnodes.

pub mod fd;

use alloc::sync::Arc;

use crate::error::ProcResult;

pub use fd::{FileRef, FileTable};

bitflags::bitflags! {
    /// File open flags (subset of POSIX O_*).
    ///
    /// The access mode lives in the low two bits: neither bit set is
    /// read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 1;
        const RDWR = 2;
        const CREAT = 4;
        const EXCL = 8;
        const TRUNC = 16;
        const APPEND = 32;
    }
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    pub fn readable(self) -> bool {
        !self.contains(OpenFlags::WRONLY)
    }

    pub fn writable(self) -> bool {
        self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR)
    }
}

/// An open file system object.
pub trait Vnode: Send + Sync {
    /// Name the vnode was opened under (diagnostics only).
    fn name(&self) -> &str;

    /// Release the open reference. Called once, when the last file handle
    /// on this vnode is destroyed.
    fn close(&self);
}

/// Path lookup.
pub trait Vfs {
    /// Open `path`; `NotFound` if it does not exist.
    fn open(&self, path: &str, flags: OpenFlags) -> ProcResult<Arc<dyn Vnode>>;
}
