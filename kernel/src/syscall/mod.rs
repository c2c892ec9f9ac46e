//! System call handling module.
//!
//! Decodes a trapped system call from the caller's [`TrapFrame`], runs the
//! process-control handler and writes the result back: the value in RAX on
//! success, `-errno` on failure, with the PC stepped past the syscall
//! instruction. `_exit` and a successful `execv` do not return to the
//! trapping code.

pub mod handlers;

use crate::error::ProcError;
use crate::process::{Pid, ProcessManager, TrapFrame};

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    /// Duplicate the calling process.
    Fork = 0,
    /// Replace the program image.
    Execv = 2,
    /// Terminate the calling process.
    Exit = 3,
    /// Wait for a child to exit.
    Waitpid = 4,
    /// Get process ID.
    GetPid = 5,
    /// Get parent process ID.
    GetPpid = 6,
}

impl TryFrom<u64> for SyscallNumber {
    type Error = ProcError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyscallNumber::Fork),
            2 => Ok(SyscallNumber::Execv),
            3 => Ok(SyscallNumber::Exit),
            4 => Ok(SyscallNumber::Waitpid),
            5 => Ok(SyscallNumber::GetPid),
            6 => Ok(SyscallNumber::GetPpid),
            _ => Err(ProcError::NoSuchSyscall),
        }
    }
}

/// System call result.
pub type SyscallResult = Result<Completion, ProcError>;

/// How a handled system call ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Return this value to the caller.
    Value(u64),
    /// The process is gone; end the calling thread.
    ExitThread,
    /// Enter a new program image with this frame.
    EnterUser(TrapFrame),
}

/// System call context (registers at syscall time).
#[derive(Debug, Clone, Copy)]
pub struct SyscallContext {
    /// System call number.
    pub syscall_num: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
    pub arg6: u64,
}

impl From<&TrapFrame> for SyscallContext {
    fn from(frame: &TrapFrame) -> Self {
        let (arg1, arg2, arg3, arg4, arg5, arg6) = frame.syscall_args();
        Self {
            syscall_num: frame.syscall_num(),
            arg1,
            arg2,
            arg3,
            arg4,
            arg5,
            arg6,
        }
    }
}

/// Dispatch a system call trapped by `caller`.
///
/// For calls that return, `frame` is updated in place and
/// `Completion::Value` is returned. Otherwise `frame` is left as it was.
pub fn dispatch(manager: &ProcessManager, caller: Pid, frame: &mut TrapFrame) -> Completion {
    let ctx = SyscallContext::from(&*frame);

    let result = match SyscallNumber::try_from(ctx.syscall_num) {
        Ok(syscall) => handlers::handle(manager, caller, syscall, &ctx, &*frame),
        Err(err) => Err(err),
    };

    #[cfg(feature = "trace-syscalls")]
    log::trace!(
        "[PROC] PID {} syscall {} ({:#x}, {:#x}, {:#x}) -> {:?}",
        caller,
        ctx.syscall_num,
        ctx.arg1,
        ctx.arg2,
        ctx.arg3,
        result
    );

    match result {
        Ok(Completion::Value(value)) => {
            frame.set_syscall_return(value);
            frame.advance_pc();
            Completion::Value(value)
        }
        Ok(other) => other,
        Err(err) => {
            frame.set_syscall_error(err.errno());
            frame.advance_pc();
            Completion::Value(frame.rax)
        }
    }
}

/// Trap-return path for process-control calls: finishes what [`dispatch`]
/// decided, ending the thread or entering the new image when the call does
/// not return.
pub fn handle_syscall(manager: &ProcessManager, caller: Pid, frame: &mut TrapFrame) {
    match dispatch(manager, caller, frame) {
        Completion::Value(_) => {}
        Completion::ExitThread => manager.platform().exit_thread(),
        Completion::EnterUser(entry) => manager.platform().enter_user_mode(entry),
    }
}
