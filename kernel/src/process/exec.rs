//! execv
//!
//! Replaces the caller's program image. Everything that can fail without
//! side effects (argument copy-in, path checks, opening the program,
//! creating the new address space) happens before the old image is
//! destroyed. Past that point a failure cannot be reported to the old
//! program, so the process is terminated instead.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use super::context::TrapFrame;
use super::manager::ProcessManager;
use super::status::ExitReason;
use super::table::{Pid, Process};
use crate::config::{ARG_MAX, FATAL_EXEC_SIGNAL, PATH_MAX};
use crate::error::{ProcError, ProcResult};
use crate::loader::program::padded_len;
use crate::loader::ArgBlock;
use crate::memory::uaccess::{read_user_cstr, read_user_ptr, USER_PTR_SIZE};
use crate::memory::AddressSpace;
use crate::vfs::{OpenFlags, Vnode};

/// Most pointers an argv array may hold before its terminator.
const MAX_ARGS: usize = ARG_MAX / USER_PTR_SIZE;

/// Failure of `execv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The old image is intact and the call returns the error.
    Recoverable(ProcError),
    /// The old image was already gone; the process has been terminated.
    Fatal(ProcError),
}

impl ExecError {
    pub fn error(self) -> ProcError {
        match self {
            ExecError::Recoverable(err) | ExecError::Fatal(err) => err,
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, ExecError::Fatal(_))
    }
}

impl From<ProcError> for ExecError {
    fn from(err: ProcError) -> Self {
        ExecError::Recoverable(err)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Recoverable(err) => write!(f, "{}", err),
            ExecError::Fatal(err) => write!(f, "{} (fatal)", err),
        }
    }
}

/// Register state for entering a freshly loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEntry {
    pub argc: usize,
    /// User address of the argv array.
    pub argv: u64,
    /// Always null; environments are not passed.
    pub envp: u64,
    pub sp: u64,
    pub entry: u64,
}

impl UserEntry {
    pub fn trap_frame(&self) -> TrapFrame {
        TrapFrame::new_user(self.entry, self.sp, self.argc as u64, self.argv, self.envp)
    }
}

/// Closes the program vnode when exec is done with it, on every path.
struct OpenProgram(Arc<dyn Vnode>);

impl Drop for OpenProgram {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Copy the argv strings named by the user pointer array at `argv_ptr`.
fn copy_in_args(space: &dyn AddressSpace, argv_ptr: u64) -> ProcResult<Vec<Vec<u8>>> {
    let mut args = Vec::new();
    let mut total = USER_PTR_SIZE;

    while args.len() < MAX_ARGS {
        let slot = argv_ptr
            .checked_add((args.len() * USER_PTR_SIZE) as u64)
            .ok_or(ProcError::BadAddress)?;
        let ptr = read_user_ptr(space, slot)?;
        if ptr == 0 {
            return Ok(args);
        }

        let remaining = ARG_MAX.saturating_sub(total + USER_PTR_SIZE);
        let arg = read_user_cstr(space, u64::from(ptr), remaining).map_err(|err| match err {
            ProcError::NameTooLong => ProcError::ArgListTooLong,
            other => other,
        })?;
        total += USER_PTR_SIZE + padded_len(arg.len());
        if total > ARG_MAX {
            return Err(ProcError::ArgListTooLong);
        }
        args.push(arg);
    }

    Err(ProcError::ArgListTooLong)
}

impl ProcessManager {
    /// `execv(path, argv)` for `caller`.
    ///
    /// `path_ptr` and `argv_ptr` are user addresses in the caller's address
    /// space. On success the caller's image has been replaced and it must
    /// enter user mode with the returned entry.
    pub fn execv(&self, caller: Pid, path_ptr: u64, argv_ptr: u64) -> Result<UserEntry, ExecError> {
        let process = self.table.lookup(caller).ok_or(ProcError::UnknownPid)?;

        let (path, args) = process.with_space(|space| {
            let path = read_user_cstr(space, path_ptr, PATH_MAX)?;
            let args = copy_in_args(space, argv_ptr)?;
            Ok((path, args))
        })?;

        self.exec_image(&process, &path, &args)
    }

    /// Replace the image of `process` with the program at `path`.
    pub(crate) fn exec_image(
        &self,
        process: &Process,
        path: &[u8],
        args: &[Vec<u8>],
    ) -> Result<UserEntry, ExecError> {
        if path.is_empty() {
            return Err(ProcError::EmptyPath.into());
        }
        // Nothing with a non-UTF-8 name can exist in the namespace.
        let path = core::str::from_utf8(path).map_err(|_| ProcError::NotFound)?;
        let block = ArgBlock::new(args)?;

        let program = OpenProgram(self.platform.open(path, OpenFlags::RDONLY)?);
        let space = self.platform.create_address_space()?;

        // Point of no return: the old image is destroyed here.
        drop(process.replace_space(space));

        match self.load_image(process, &program, &block) {
            Ok(entry) => {
                process.set_name(String::from(path));
                log::debug!(
                    "[PROC] PID {} exec {} (argc={}, entry={:#x})",
                    process.pid(),
                    path,
                    entry.argc,
                    entry.entry
                );
                Ok(entry)
            }
            Err(err) => {
                log::warn!(
                    "[PROC] PID {} exec {} failed after teardown: {}",
                    process.pid(),
                    path,
                    err
                );
                drop(program);
                // The process is already gone from its own point of view;
                // a second failure here has nobody to report to.
                let _ = self.exit(process.pid(), ExitReason::Signaled(FATAL_EXEC_SIGNAL));
                Err(ExecError::Fatal(err))
            }
        }
    }

    fn load_image(
        &self,
        process: &Process,
        program: &OpenProgram,
        block: &ArgBlock,
    ) -> ProcResult<UserEntry> {
        process.with_space(|space| {
            let entry = self.platform.load_elf(&*program.0, space)?;
            let stack_top = space.define_stack()?;
            let image = block.copy_out(space, stack_top)?;
            Ok(UserEntry {
                argc: image.argc,
                argv: image.argv,
                envp: 0,
                sp: image.sp,
                entry,
            })
        })
    }
}
