//! Process subsystem configuration.
//!
//! Compile-time limits of the user ABI and the process table, plus the
//! runtime [`ProcConfig`] handed to [`ProcessManager::new`].
//!
//! [`ProcessManager::new`]: crate::process::ProcessManager::new

/// Page size (4 KB).
pub const PAGE_SIZE: u64 = 4096;

/// First address above user space.
pub const USERSPACE_TOP: u64 = 0x8000_0000;

/// Initial user stack top handed out by `define_stack`.
pub const USER_STACK_TOP: u64 = USERSPACE_TOP;

/// Length of the syscall instruction; the PC is advanced by this much when
/// a syscall returns.
pub const SYSCALL_INSN_LEN: u64 = 2;

/// Lowest PID handed out to user processes.
pub const PID_MIN: u32 = 2;

/// Highest PID the allocator may ever hand out.
pub const PID_MAX: u32 = 32767;

/// Default number of process table slots (including the root).
pub const MAX_PROCESSES: usize = 128;

/// Default number of descriptor slots per process.
pub const OPEN_MAX: usize = 64;

/// Longest path accepted by `execv`, terminator included.
pub const PATH_MAX: usize = 1024;

/// Upper bound on the marshalled argument block (strings and pointers).
pub const ARG_MAX: usize = 64 * 1024;

/// Signal numbers a signalled wait status may carry.
pub const SIG_MIN: i32 = 1;
pub const SIG_MAX: i32 = 32;

/// SIGKILL; reported for a process whose exec failed after its old image
/// was torn down.
pub const FATAL_EXEC_SIGNAL: i32 = 9;

/// Console device opened for descriptors 0, 1 and 2 of the first process.
pub const CONSOLE_DEVICE: &str = "con:";

/// Runtime configuration of the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcConfig {
    /// Number of process table slots, the root process included.
    pub max_processes: usize,
    /// Descriptor slots per process.
    pub open_max: usize,
    /// Open the console on descriptors 0..=2 in `run_program`.
    pub console_stdio: bool,
}

impl ProcConfig {
    pub const fn new() -> Self {
        Self {
            max_processes: MAX_PROCESSES,
            open_max: OPEN_MAX,
            console_stdio: true,
        }
    }

    /// Clamp the limits into the ranges the table can represent.
    ///
    /// At least two slots are kept (root plus one user process) and no
    /// more than `PID_MAX - PID_MIN + 2`.
    pub fn normalized(self) -> Self {
        let ceiling = (PID_MAX - PID_MIN) as usize + 2;
        Self {
            max_processes: self.max_processes.clamp(2, ceiling),
            open_max: self.open_max.max(3),
            console_stdio: self.console_stdio,
        }
    }
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self::new()
    }
}
