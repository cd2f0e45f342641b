//! ABI layer for `malloc`, `calloc`, `realloc`, `free`, and `posix_memalign`.
//!
//! Each function locks the process-wide heap, delegates to
//! `heaparena_core`, and translates `AllocError` to the usual
//! null-pointer-plus-`errno` (or non-zero return code) POSIX contract.
//!
//! Suppressed under `cfg(test)`: a `#[no_mangle] malloc` linked into the
//! test binary would shadow the system allocator the test harness itself
//! depends on, causing infinite recursion rather than a clean failure. See
//! `heaparena_core`'s own test suite for the behavior these symbols wrap.

use std::ffi::c_void;
use std::ptr::NonNull;

use heaparena_core::AllocError;
use libc::{EINVAL, ENOMEM, c_int, size_t};

use crate::errno_abi::set_errno;

fn translate_error(err: AllocError) {
    match err {
        AllocError::InvalidAlignment => set_errno(EINVAL),
        AllocError::OutOfMemory => set_errno(ENOMEM),
        // Matches the preserved behavior of the system this is modeled on:
        // an unrecognized pointer does not touch errno.
        AllocError::UnknownPointer => {}
    }
}

const WORD_ALIGN: usize = std::mem::size_of::<usize>();

/// POSIX `malloc` — allocates `size` bytes of uninitialized memory aligned
/// to the platform's word size. `malloc(0)` returns null.
///
/// # Safety
/// The returned pointer must eventually be passed to `free` at most once,
/// or to `realloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: size_t) -> *mut c_void {
    if size == 0 {
        return std::ptr::null_mut();
    }
    match heaparena_core::allocate(size, WORD_ALIGN) {
        Ok(ptr) => ptr.as_ptr().cast(),
        Err(err) => {
            translate_error(err);
            std::ptr::null_mut()
        }
    }
}

/// POSIX `free` — releases memory returned by `malloc`/`calloc`/`realloc`/
/// `posix_memalign`. A null pointer is a no-op; an unrecognized or already
/// freed pointer is ignored rather than aborting.
///
/// # Safety
/// `ptr` must be null or have been returned by this crate's allocation
/// functions and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
        return;
    };
    heaparena_core::release(ptr);
}

/// POSIX `calloc` — allocates zeroed memory for `nmemb` elements of `size`
/// bytes each. Returns null, without touching `errno`, if either is `0`.
/// Overflow of `nmemb * size` is otherwise unguarded, matching the
/// preserved behavior of the system this is modeled on.
///
/// # Safety
/// The returned pointer must eventually be passed to `free` at most once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(nmemb: size_t, size: size_t) -> *mut c_void {
    if nmemb == 0 || size == 0 {
        return std::ptr::null_mut();
    }
    match heaparena_core::zero_allocate(nmemb, size) {
        Ok(ptr) => ptr.as_ptr().cast(),
        Err(err) => {
            translate_error(err);
            std::ptr::null_mut()
        }
    }
}

/// POSIX `realloc` — resizes a previous allocation, relocating it if
/// necessary. `realloc(NULL, size)` behaves like `malloc(size)`.
/// `realloc(ptr, 0)` is the preserved quirk described in `heaparena_core`:
/// it releases the block but still returns `ptr` rather than null.
///
/// # Safety
/// `ptr` must be null or have been returned by this crate's allocation
/// functions and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void {
    let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
        return unsafe { malloc(size) };
    };
    match heaparena_core::resize(ptr, size) {
        Ok(new_ptr) => new_ptr.as_ptr().cast(),
        Err(err) => {
            translate_error(err);
            std::ptr::null_mut()
        }
    }
}

/// POSIX `posix_memalign` — allocates `size` bytes aligned to `alignment`,
/// writing the result through `*memptr`. Returns `0` on success or an
/// error code (never setting `errno`, per the POSIX `posix_memalign`
/// contract). `size == 0` writes a null pointer and returns `0` before
/// `alignment` is even validated.
///
/// # Safety
/// `memptr` must be valid for a single aligned write of a pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_memalign(memptr: *mut *mut c_void, alignment: size_t, size: size_t) -> c_int {
    if size == 0 {
        // Checked before alignment validation: a zero-size request
        // succeeds with a null result regardless of `alignment`.
        unsafe { memptr.write(std::ptr::null_mut()) };
        return 0;
    }
    match heaparena_core::allocate(size, alignment) {
        Ok(ptr) => {
            // SAFETY: caller guarantees `memptr` is valid for one write.
            unsafe { memptr.write(ptr.as_ptr().cast()) };
            0
        }
        Err(AllocError::InvalidAlignment) => EINVAL,
        Err(AllocError::OutOfMemory) => ENOMEM,
        Err(AllocError::UnknownPointer) => unreachable!("allocate never returns UnknownPointer"),
    }
}

/// Writes a heap summary to stderr, in the spirit of glibc's
/// `malloc_stats`. Takes no lock beyond what `with_allocator` already
/// provides and never panics: diagnostic failures are swallowed rather
/// than surfaced to the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc_stats() {
    heaparena_core::with_allocator(|allocator| {
        let mut stderr = std::io::stderr();
        let _ = heaparena_core::diagnose(allocator, &mut stderr);
    });
}
