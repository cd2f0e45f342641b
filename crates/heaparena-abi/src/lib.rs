//! `extern "C"` boundary exposing `malloc`/`calloc`/`realloc`/`free`/
//! `posix_memalign` over `heaparena_core`'s process-wide allocator.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> heaparena_core::with_allocator -> Allocator
//! ```

pub mod errno_abi;

// Gated behind cfg(not(test)): a #[no_mangle] malloc linked into the test
// binary would shadow the system allocator the test harness itself runs
// on, causing infinite recursion rather than a clean failure.
#[cfg(not(test))]
pub mod malloc_abi;
