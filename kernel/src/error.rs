//! Process subsystem error types.
//!
//! Every public operation returns [`ProcResult`]; the syscall layer turns
//! the error into a negative errno with [`ProcError::errno`].

use core::fmt;

/// Errno values reported to user space.
pub mod errno {
    pub const ENOSYS: i64 = 1;
    pub const ENOMEM: i64 = 3;
    pub const EFAULT: i64 = 6;
    pub const ENAMETOOLONG: i64 = 7;
    pub const EINVAL: i64 = 8;
    pub const ENPROC: i64 = 12;
    pub const ENOEXEC: i64 = 13;
    pub const E2BIG: i64 = 14;
    pub const ESRCH: i64 = 15;
    pub const ECHILD: i64 = 16;
    pub const EISDIR: i64 = 18;
    pub const ENOENT: i64 = 19;
    pub const EMFILE: i64 = 28;
    pub const EBADF: i64 = 30;
}

/// Result alias used across the crate.
pub type ProcResult<T> = Result<T, ProcError>;

/// Process control error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// An allocation or address-space duplication failed.
    OutOfMemory,
    /// The process table has no free slot.
    ResourceExhausted,
    /// A user pointer is outside user space or in the reserved low page.
    BadAddress,
    /// `execv` was given an empty program path.
    EmptyPath,
    /// The program file does not exist.
    NotFound,
    /// A user string is longer than the kernel accepts.
    NameTooLong,
    /// The argument vector is unterminated or too large.
    ArgListTooLong,
    /// No process with this PID exists.
    UnknownPid,
    /// The target is not a child of the caller.
    NotAChild,
    /// A process tried to wait for itself.
    SelfWait,
    /// `waitpid` options other than zero.
    BadOptions,
    /// Descriptor out of range or not open.
    BadDescriptor,
    /// The descriptor table is full.
    TooManyFiles,
    /// The loader rejected the program image.
    Loader,
    /// Unknown syscall number.
    NoSuchSyscall,
}

impl ProcError {
    /// Positive errno value for this error.
    pub const fn errno(self) -> i64 {
        use errno::*;
        match self {
            ProcError::OutOfMemory => ENOMEM,
            ProcError::ResourceExhausted => ENPROC,
            ProcError::BadAddress => EFAULT,
            ProcError::EmptyPath => EISDIR,
            ProcError::NotFound => ENOENT,
            ProcError::NameTooLong => ENAMETOOLONG,
            ProcError::ArgListTooLong => E2BIG,
            ProcError::UnknownPid => ESRCH,
            ProcError::NotAChild | ProcError::SelfWait => ECHILD,
            ProcError::BadOptions => EINVAL,
            ProcError::BadDescriptor => EBADF,
            ProcError::TooManyFiles => EMFILE,
            ProcError::Loader => ENOEXEC,
            ProcError::NoSuchSyscall => ENOSYS,
        }
    }
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::OutOfMemory => write!(f, "out of memory"),
            ProcError::ResourceExhausted => write!(f, "process table full"),
            ProcError::BadAddress => write!(f, "bad user address"),
            ProcError::EmptyPath => write!(f, "empty program path"),
            ProcError::NotFound => write!(f, "no such file"),
            ProcError::NameTooLong => write!(f, "name too long"),
            ProcError::ArgListTooLong => write!(f, "argument list too long"),
            ProcError::UnknownPid => write!(f, "no such process"),
            ProcError::NotAChild => write!(f, "not a child of the caller"),
            ProcError::SelfWait => write!(f, "process cannot wait for itself"),
            ProcError::BadOptions => write!(f, "invalid wait options"),
            ProcError::BadDescriptor => write!(f, "bad file descriptor"),
            ProcError::TooManyFiles => write!(f, "too many open files"),
            ProcError::Loader => write!(f, "bad executable image"),
            ProcError::NoSuchSyscall => write!(f, "no such system call"),
        }
    }
}
