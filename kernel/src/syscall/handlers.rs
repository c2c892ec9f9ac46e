//! System call handlers.
//!
//! This module implements the handlers for each system call.

use super::{Completion, SyscallContext, SyscallNumber, SyscallResult};
use crate::error::ProcError;
use crate::process::{ExecError, ExitReason, Pid, ProcessManager, TrapFrame};

/// Handle a system call.
pub fn handle(
    manager: &ProcessManager,
    caller: Pid,
    syscall: SyscallNumber,
    ctx: &SyscallContext,
    frame: &TrapFrame,
) -> SyscallResult {
    match syscall {
        SyscallNumber::Fork => handle_fork(manager, caller, frame),
        SyscallNumber::Execv => handle_execv(manager, caller, ctx),
        SyscallNumber::Exit => handle_exit(manager, caller, ctx),
        SyscallNumber::Waitpid => handle_waitpid(manager, caller, ctx),
        SyscallNumber::GetPid => handle_getpid(manager, caller),
        SyscallNumber::GetPpid => handle_getppid(manager, caller),
    }
}

/// PID argument; zero, negative and out-of-range values name no single
/// process.
fn pid_arg(raw: u64) -> Result<Pid, ProcError> {
    match i32::try_from(raw as i64) {
        Ok(pid) if pid > 0 => Ok(Pid(pid as u32)),
        _ => Err(ProcError::UnknownPid),
    }
}

/// Fork the calling process.
fn handle_fork(manager: &ProcessManager, caller: Pid, frame: &TrapFrame) -> SyscallResult {
    let child = manager.fork(caller, frame)?;
    Ok(Completion::Value(u64::from(child.as_u32())))
}

/// Execute a new program.
fn handle_execv(manager: &ProcessManager, caller: Pid, ctx: &SyscallContext) -> SyscallResult {
    match manager.execv(caller, ctx.arg1, ctx.arg2) {
        Ok(entry) => Ok(Completion::EnterUser(entry.trap_frame())),
        Err(ExecError::Fatal(_)) => Ok(Completion::ExitThread),
        Err(ExecError::Recoverable(err)) => Err(err),
    }
}

/// Exit the current process.
fn handle_exit(manager: &ProcessManager, caller: Pid, ctx: &SyscallContext) -> SyscallResult {
    let code = ctx.arg1 as i32;
    if let Err(err) = manager.exit(caller, ExitReason::Exited(code)) {
        log::warn!("[PROC] exit of PID {} failed: {}", caller, err);
    }
    Ok(Completion::ExitThread)
}

/// Wait for a child process.
fn handle_waitpid(manager: &ProcessManager, caller: Pid, ctx: &SyscallContext) -> SyscallResult {
    let target = pid_arg(ctx.arg1)?;
    let pid = manager.waitpid(caller, target, ctx.arg2, ctx.arg3 as u32)?;
    Ok(Completion::Value(u64::from(pid.as_u32())))
}

fn handle_getpid(manager: &ProcessManager, caller: Pid) -> SyscallResult {
    let pid = manager.getpid(caller)?;
    Ok(Completion::Value(u64::from(pid.as_u32())))
}

fn handle_getppid(manager: &ProcessManager, caller: Pid) -> SyscallResult {
    let ppid = manager.getppid(caller)?;
    Ok(Completion::Value(u64::from(ppid.as_u32())))
}
