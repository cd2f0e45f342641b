//! The OS page mapper. This is the minimal real implementation of the
//! arena manager's "give me fresh anonymous memory" dependency: a trait so
//! the core depends on an abstraction, and one concrete implementation
//! backed by the host's `mmap`/`munmap`.

use std::ptr::NonNull;

use crate::error::AllocError;

pub trait PageProvider {
    /// Maps `len` bytes of fresh, zeroed, anonymous, read-write memory.
    fn map(&self, len: usize) -> Result<NonNull<u8>, AllocError>;

    /// Unmaps a region previously returned by `map` with the same `len`.
    ///
    /// # Safety
    /// `ptr`/`len` must exactly match a prior, still-live `map` call.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize);
}

/// Maps pages via the host's `mmap`/`munmap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPageProvider;

impl PageProvider for SystemPageProvider {
    fn map(&self, len: usize) -> Result<NonNull<u8>, AllocError> {
        // SAFETY: fixed, valid prot/flags combination, no file descriptor.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(AllocError::OutOfMemory);
        }
        // SAFETY: mmap succeeded, so `ptr` is non-null.
        Ok(unsafe { NonNull::new_unchecked(ptr.cast()) })
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
        // SAFETY: caller guarantees `ptr`/`len` match a live mapping from `map`.
        unsafe {
            libc::munmap(ptr.as_ptr().cast(), len);
        }
    }
}

/// The host's page size, read once via `sysconf` and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: `_SC_PAGESIZE` is always a valid sysconf name.
        let value = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        value.max(4096) as usize
    })
}
