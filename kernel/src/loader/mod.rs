//! Program Loader
//!
//! Loading an executable image into an address space is done by the
//! kernel's ELF loader behind [`ProgramLoader`]. This module owns what
//! happens around it: the initial user stack and the marshalling of the
//! argument vector onto it.
//!
//! # Initial stack
//!
//! ```text
//! stack top ──►  ┌──────────────────────────┐
//!                │ argument strings, each   │
//!                │ NUL-padded to 4 bytes    │
//!    blob base ─►├──────────────────────────┤
//!                │ argv[0] .. argv[argc-1]  │
//!                │ NULL                     │
//!    sp, argv ──►└──────────────────────────┘
//! ```

pub mod program;

use crate::error::ProcResult;
use crate::memory::AddressSpace;
use crate::vfs::Vnode;

pub use program::{ArgBlock, StackImage};

/// Executable image loader.
pub trait ProgramLoader {
    /// Map the program in `vnode` into `space` and return its entry point.
    ///
    /// `space` is already active on the calling CPU.
    fn load_elf(&self, vnode: &dyn Vnode, space: &mut dyn AddressSpace) -> ProcResult<u64>;
}
