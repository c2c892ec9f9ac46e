//! KPROC: process control for a teaching kernel
//!
//! This crate owns the process table of the kernel and implements the
//! process-lifecycle system calls on top of it:
//!
//! - `fork`: duplicate the calling process (address space, open files,
//!   trap frame) into a new child that resumes with a zero return value
//! - `execv`: replace the calling process's image with a freshly loaded
//!   program, marshalling `argv` onto the new user stack
//! - `exit` / `waitpid`: publish termination and reclaim zombies, with
//!   orphan reparenting to the root process
//! - `getpid` / `getppid`
//!
//! # Architecture
//!
//! The crate does not schedule threads, manage page tables or parse ELF
//! images itself. Those services are reached through the traits gathered
//! in [`Platform`]:
//!
//! - [`scheduler::Scheduler`]: execution units and user-mode entry
//! - [`memory::AddressSpace`] / [`memory::VirtualMemory`]: address spaces
//!   and the user copy-in/copy-out primitives
//! - [`vfs::Vfs`] / [`vfs::Vnode`]: opening program files and the console
//! - [`loader::ProgramLoader`]: mapping a program image
//!
//! Everything above those seams lives in [`process`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod loader;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod vfs;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

pub use config::ProcConfig;
pub use error::{ProcError, ProcResult};
pub use process::{ExecError, Pid, ProcessManager, WaitStatus};

/// Every kernel service the process subsystem consumes.
///
/// Implemented automatically for any type providing all the individual
/// seams.
pub trait Platform:
    scheduler::Scheduler
    + memory::VirtualMemory
    + loader::ProgramLoader
    + vfs::Vfs
    + Send
    + Sync
{
}

impl<T> Platform for T where
    T: scheduler::Scheduler
        + memory::VirtualMemory
        + loader::ProgramLoader
        + vfs::Vfs
        + Send
        + Sync
{
}
