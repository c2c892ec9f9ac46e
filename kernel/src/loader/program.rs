//! Argument marshalling
//!
//! Packs `argv` strings into the layout a freshly loaded program expects
//! on its initial stack.

use alloc::vec::Vec;

use crate::config::ARG_MAX;
use crate::error::{ProcError, ProcResult};
use crate::memory::uaccess::{copy_to_user, USER_PTR_SIZE};
use crate::memory::AddressSpace;

/// Alignment of each string's slot in the blob.
const ARG_ALIGN: usize = 4;

/// Marshalled argument vector, not yet placed on a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBlock {
    /// Offset of each argument inside `blob`.
    offsets: Vec<usize>,
    /// Concatenated, NUL-padded argument strings.
    blob: Vec<u8>,
}

/// Where an [`ArgBlock`] ended up on the user stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackImage {
    /// Number of arguments.
    pub argc: usize,
    /// User address of the argv pointer array.
    pub argv: u64,
    /// User address of the first argument string.
    pub strings: u64,
    /// Initial stack pointer (equal to `argv`).
    pub sp: u64,
}

/// Slot width of a string of `len` bytes.
///
/// Always adds 1..=4 NUL bytes, so a string whose length is already a
/// multiple of four still gets a full word of terminator.
pub const fn padded_len(len: usize) -> usize {
    len + (ARG_ALIGN - len % ARG_ALIGN)
}

impl ArgBlock {
    /// Build the string blob for `args`, in order.
    ///
    /// Fails with `ArgListTooLong` if strings plus pointer array exceed
    /// `ARG_MAX`.
    pub fn new<A: AsRef<[u8]>>(args: &[A]) -> ProcResult<Self> {
        let argv_len = (args.len() + 1) * USER_PTR_SIZE;
        let blob_len: usize = args.iter().map(|a| padded_len(a.as_ref().len())).sum();
        if argv_len + blob_len > ARG_MAX {
            return Err(ProcError::ArgListTooLong);
        }

        let mut offsets = Vec::with_capacity(args.len());
        let mut blob = Vec::with_capacity(blob_len);
        for arg in args {
            let arg = arg.as_ref();
            offsets.push(blob.len());
            blob.extend_from_slice(arg);
            blob.resize(blob.len() + padded_len(arg.len()) - arg.len(), 0);
        }

        Ok(Self { offsets, blob })
    }

    pub fn argc(&self) -> usize {
        self.offsets.len()
    }

    /// Bytes of padded strings.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Bytes of the argv array, NULL entry included.
    pub fn argv_len(&self) -> usize {
        (self.argc() + 1) * USER_PTR_SIZE
    }

    /// Stack bytes consumed below `stack_top`.
    pub fn stack_len(&self) -> usize {
        self.argv_len() + self.blob.len()
    }

    /// Place the block directly below `stack_top`.
    pub fn layout(&self, stack_top: u64) -> ProcResult<StackImage> {
        let strings = stack_top
            .checked_sub(self.blob.len() as u64)
            .ok_or(ProcError::BadAddress)?;
        let argv = strings
            .checked_sub(self.argv_len() as u64)
            .ok_or(ProcError::BadAddress)?;
        Ok(StackImage {
            argc: self.argc(),
            argv,
            strings,
            sp: argv,
        })
    }

    /// Encode the argv array for strings living at `strings`.
    pub fn argv_bytes(&self, strings: u64) -> ProcResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.argv_len());
        for offset in &self.offsets {
            let ptr = u32::try_from(strings + *offset as u64).map_err(|_| ProcError::BadAddress)?;
            out.extend_from_slice(&ptr.to_ne_bytes());
        }
        out.extend_from_slice(&0u32.to_ne_bytes());
        Ok(out)
    }

    /// Copy the argv array and then the strings onto the stack of `space`.
    pub fn copy_out(&self, space: &mut dyn AddressSpace, stack_top: u64) -> ProcResult<StackImage> {
        let image = self.layout(stack_top)?;
        let argv = self.argv_bytes(image.strings)?;

        log::trace!(
            "[PROC] argv: argc={} argv={:#x} strings={:#x} ({} bytes)",
            image.argc,
            image.argv,
            image.strings,
            self.blob.len()
        );

        copy_to_user(space, image.argv, &argv)?;
        copy_to_user(space, image.strings, &self.blob)?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USER_STACK_TOP;
    use crate::memory::uaccess::{read_user_cstr, read_user_ptr};
    use crate::testing::SparseSpace;

    #[test]
    fn test_padding_always_terminates() {
        assert_eq!(padded_len(0), 4);
        assert_eq!(padded_len(1), 4);
        assert_eq!(padded_len(3), 4);
        assert_eq!(padded_len(4), 8);
        assert_eq!(padded_len(5), 8);
    }

    #[test]
    fn test_blob_layout() {
        let block = ArgBlock::new(&["/prog", "a", "bb"]).unwrap();
        assert_eq!(block.argc(), 3);
        assert_eq!(block.blob().len(), 8 + 4 + 4);
        assert_eq!(&block.blob()[..8], b"/prog\0\0\0");
        assert_eq!(&block.blob()[8..12], b"a\0\0\0");
        assert_eq!(&block.blob()[12..16], b"bb\0\0");
        assert_eq!(block.argv_len(), 4 * 4);
    }

    #[test]
    fn test_layout_below_stack_top() {
        let block = ArgBlock::new(&["/prog", "a", "bb"]).unwrap();
        let image = block.layout(USER_STACK_TOP).unwrap();

        assert_eq!(image.strings, USER_STACK_TOP - 16);
        assert_eq!(image.argv, image.strings - 16);
        assert_eq!(image.sp, image.argv);
        assert_eq!(image.argv % 4, 0);
    }

    #[test]
    fn test_copy_out_writes_pointers_and_strings() {
        let mut space = SparseSpace::new();
        let block = ArgBlock::new(&["/prog", "a", "bb"]).unwrap();
        let image = block.copy_out(&mut space, USER_STACK_TOP).unwrap();

        let expected: [&[u8]; 3] = [b"/prog", b"a", b"bb"];
        for (i, want) in expected.iter().enumerate() {
            let ptr = read_user_ptr(&space, image.argv + (i * 4) as u64).unwrap();
            assert!(u64::from(ptr) >= image.strings);
            assert_eq!(read_user_cstr(&space, u64::from(ptr), 64).unwrap(), *want);
        }
        assert_eq!(read_user_ptr(&space, image.argv + 12).unwrap(), 0);
    }

    #[test]
    fn test_empty_argv() {
        let block = ArgBlock::new::<&str>(&[]).unwrap();
        let image = block.layout(USER_STACK_TOP).unwrap();
        assert_eq!(image.argc, 0);
        assert_eq!(image.strings, USER_STACK_TOP);
        assert_eq!(block.argv_bytes(image.strings).unwrap(), 0u32.to_ne_bytes());
    }

    #[test]
    fn test_too_large() {
        let big = alloc::vec![b'x'; ARG_MAX];
        assert_eq!(ArgBlock::new(&[big]), Err(ProcError::ArgListTooLong));
    }
}
