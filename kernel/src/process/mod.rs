//! Process Management
//!
//! The process table and the lifecycle operations on it: fork, execv,
//! exit, waitpid, getpid and getppid.
//!
//! Every process except the root has exactly one parent. A parent that
//! exits first hands its children to the root ([`Pid::KERNEL`]), which
//! reclaims them with [`ProcessManager::wait_child`] or
//! [`ProcessManager::reap_orphans`].

pub mod context;
pub mod exec;
pub mod exit;
pub mod fork;
pub mod manager;
pub mod status;
pub mod table;

pub use context::TrapFrame;
pub use exec::{ExecError, UserEntry};
pub use exit::WaitOptions;
pub use manager::ProcessManager;
pub use status::{ExitReason, WaitStatus};
pub use table::{Pid, Process, ProcessSnapshot, ProcessState, ProcessTable};
