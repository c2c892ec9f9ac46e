//! User memory access helpers.
//!
//! Range checks happen here before the address space is asked to copy, so
//! a pointer into the null page or into kernel space is rejected without
//! touching any mapping.

use alloc::vec::Vec;

use crate::config::{PAGE_SIZE, USERSPACE_TOP};
use crate::error::{ProcError, ProcResult};
use crate::memory::AddressSpace;

/// Size of a user pointer.
pub const USER_PTR_SIZE: usize = core::mem::size_of::<u32>();

/// Check that `[ptr, ptr + len)` lies in user space above the null page.
pub fn validate_user_range(ptr: u64, len: u64) -> ProcResult<()> {
    if ptr < PAGE_SIZE {
        return Err(ProcError::BadAddress);
    }
    let end = ptr.checked_add(len).ok_or(ProcError::BadAddress)?;
    if end > USERSPACE_TOP {
        return Err(ProcError::BadAddress);
    }
    Ok(())
}

/// Copy bytes from user space into `buf`.
pub fn copy_from_user(space: &dyn AddressSpace, user_src: u64, buf: &mut [u8]) -> ProcResult<()> {
    validate_user_range(user_src, buf.len() as u64)?;
    space.copy_in(user_src, buf)
}

/// Copy bytes from `src` to user space.
pub fn copy_to_user(space: &mut dyn AddressSpace, user_dst: u64, src: &[u8]) -> ProcResult<()> {
    validate_user_range(user_dst, src.len() as u64)?;
    space.copy_out(user_dst, src)
}

/// Read one user pointer.
pub fn read_user_ptr(space: &dyn AddressSpace, user_src: u64) -> ProcResult<u32> {
    let mut word = [0u8; USER_PTR_SIZE];
    copy_from_user(space, user_src, &mut word)?;
    Ok(u32::from_ne_bytes(word))
}

/// Write one `i32` (a wait status) to user space.
pub fn write_user_i32(space: &mut dyn AddressSpace, user_dst: u64, value: i32) -> ProcResult<()> {
    copy_to_user(space, user_dst, &value.to_ne_bytes())
}

/// Read a NUL-terminated string from user space, terminator excluded.
///
/// At most `max_len` bytes (terminator included) are examined; a longer
/// string fails with `NameTooLong`. Reads never cross into a page the
/// string does not reach.
pub fn read_user_cstr(
    space: &dyn AddressSpace,
    user_src: u64,
    max_len: usize,
) -> ProcResult<Vec<u8>> {
    validate_user_range(user_src, 1)?;

    let mut out = Vec::new();
    let mut addr = user_src;
    let mut chunk = [0u8; 256];

    while out.len() < max_len {
        let to_page_end = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
        let want = chunk.len().min(to_page_end).min(max_len - out.len());
        copy_from_user(space, addr, &mut chunk[..want])?;

        if let Some(nul) = chunk[..want].iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..nul]);
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..want]);
        addr += want as u64;
    }

    Err(ProcError::NameTooLong)
}
