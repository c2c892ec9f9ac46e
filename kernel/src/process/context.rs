//! Trap frame
//!
//! User register state saved on system call entry and restored when the
//! thread returns to user mode.

use crate::config::SYSCALL_INSN_LEN;

/// User code segment selector (GDT index 4, RPL 3).
pub const USER_CS: u64 = 0x23;
/// User data/stack segment selector (GDT index 3, RPL 3).
pub const USER_DS: u64 = 0x1B;

/// RFLAGS for user entry: IF enabled, reserved bit 1 set.
const USER_RFLAGS: u64 = 0x200 | 0x2;

/// Saved user registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    // Callee-saved
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,

    // Caller-saved
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    /// Syscall number on entry, return value on exit.
    pub rax: u64,

    // Interrupt frame
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn new() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rax: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// Frame for the first entry into a freshly exec'd program.
    ///
    /// `argc`, `argv` and `envp` are passed in the first three argument
    /// registers.
    pub fn new_user(entry: u64, sp: u64, argc: u64, argv: u64, envp: u64) -> Self {
        Self {
            rdi: argc,
            rsi: argv,
            rdx: envp,
            rip: entry,
            cs: USER_CS,
            rflags: USER_RFLAGS,
            rsp: sp,
            ss: USER_DS,
            ..Self::new()
        }
    }

    /// Syscall number (from RAX)
    pub fn syscall_num(&self) -> u64 {
        self.rax
    }

    /// Syscall arguments
    pub fn syscall_args(&self) -> (u64, u64, u64, u64, u64, u64) {
        (self.rdi, self.rsi, self.rdx, self.r10, self.r8, self.r9)
    }

    pub fn set_syscall_return(&mut self, value: u64) {
        self.rax = value;
    }

    /// Store `-errno` in RAX.
    pub fn set_syscall_error(&mut self, errno: i64) {
        self.rax = errno.wrapping_neg() as u64;
    }

    /// Step past the system call instruction so the thread does not
    /// re-execute it on return.
    pub fn advance_pc(&mut self) {
        self.rip = self.rip.wrapping_add(SYSCALL_INSN_LEN);
    }

    /// Frame a forked child resumes with: identical to the parent's at the
    /// call, except that fork returns 0 and execution continues after the
    /// system call instruction.
    pub fn for_fork_child(&self) -> Self {
        let mut child = *self;
        child.set_syscall_return(0);
        child.advance_pc();
        child
    }
}
