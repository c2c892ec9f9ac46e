//! Address spaces
//!
//! The page-table manager is outside this crate. A process owns exactly one
//! [`AddressSpace`] trait object; fork duplicates it eagerly, exec replaces
//! it, and every access to user memory goes through its copy primitives.
//!
//! # Address Space Layout
//!
//! ```text
//! 0x0000_0000 - 0x0000_0FFF  Reserved (null page, never valid)
//! 0x0000_1000 - 0x7FFF_FFFF  User space (text, data, heap, stack)
//! 0x8000_0000 -              Kernel
//! ```

pub mod uaccess;

use alloc::boxed::Box;

use crate::error::ProcResult;

/// One user virtual address space.
pub trait AddressSpace: Send {
    /// Make a full, independent copy (no copy-on-write sharing).
    fn duplicate(&self) -> ProcResult<Box<dyn AddressSpace>>;

    /// Install this address space on the current CPU and flush the TLB.
    fn activate(&self);

    /// Set up the user stack region and return the initial stack pointer.
    fn define_stack(&mut self) -> ProcResult<u64>;

    /// Copy `buf.len()` bytes from user address `uaddr`.
    ///
    /// Fails with `BadAddress` instead of faulting on unmapped memory.
    fn copy_in(&self, uaddr: u64, buf: &mut [u8]) -> ProcResult<()>;

    /// Copy `data` to user address `uaddr`.
    ///
    /// Fails with `BadAddress` instead of faulting on unmapped memory.
    fn copy_out(&mut self, uaddr: u64, data: &[u8]) -> ProcResult<()>;
}

/// Creator of empty address spaces.
pub trait VirtualMemory {
    fn create_address_space(&self) -> ProcResult<Box<dyn AddressSpace>>;
}
