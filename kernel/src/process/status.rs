//! Exit status encoding
//!
//! A terminated process leaves one `i32` behind for its parent. The low two
//! bits tag how it ended, the rest carry the value:
//!
//! ```text
//!  31                               2 1 0
//! ┌──────────────────────────────────┬───┐
//! │ exit code / signal number        │tag│   tag 0 = exited, 1 = signalled
//! └──────────────────────────────────┴───┘
//! ```

use core::fmt;

use crate::config::{SIG_MAX, SIG_MIN};

const TAG_BITS: u32 = 2;
const TAG_MASK: i32 = (1 << TAG_BITS) - 1;
const TAG_EXITED: i32 = 0;
const TAG_SIGNALED: i32 = 1;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `exit(code)`; only the low 8 bits of the code are kept.
    Exited(i32),
    /// Killed by the kernel with signal number `n` (1..=32).
    Signaled(i32),
}

impl ExitReason {
    pub fn encode(self) -> WaitStatus {
        match self {
            ExitReason::Exited(code) => WaitStatus::from_parts(code & 0xff, TAG_EXITED),
            ExitReason::Signaled(sig) => {
                let sig = sig.clamp(SIG_MIN, SIG_MAX);
                WaitStatus::from_parts(sig, TAG_SIGNALED)
            }
        }
    }
}

/// Encoded status as stored in the process record and copied to user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
    raw: i32,
}

impl WaitStatus {
    /// Create from raw status.
    pub const fn from_raw(raw: i32) -> Self {
        Self { raw }
    }

    const fn from_parts(value: i32, tag: i32) -> Self {
        Self {
            raw: (value << TAG_BITS) | tag,
        }
    }

    pub const fn raw(&self) -> i32 {
        self.raw
    }

    /// Check if the process exited normally.
    pub fn exited(&self) -> bool {
        self.raw & TAG_MASK == TAG_EXITED
    }

    /// Exit code, if exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        self.exited().then_some(self.raw >> TAG_BITS)
    }

    /// Check if the process was killed by a signal.
    pub fn signaled(&self) -> bool {
        self.raw & TAG_MASK == TAG_SIGNALED
    }

    /// Signal number, if signalled.
    pub fn term_sig(&self) -> Option<i32> {
        self.signaled().then_some(self.raw >> TAG_BITS)
    }

    pub fn reason(&self) -> Option<ExitReason> {
        match self.raw & TAG_MASK {
            TAG_EXITED => Some(ExitReason::Exited(self.raw >> TAG_BITS)),
            TAG_SIGNALED => Some(ExitReason::Signaled(self.raw >> TAG_BITS)),
            _ => None,
        }
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(ExitReason::Exited(code)) => write!(f, "exited({})", code),
            Some(ExitReason::Signaled(sig)) => write!(f, "signaled({})", sig),
            None => write!(f, "unknown({:#x})", self.raw),
        }
    }
}
