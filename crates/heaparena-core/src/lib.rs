//! Arena allocator core: a POSIX-host dynamic memory manager built from
//! address-ordered arenas of address-ordered, free-list-linked blocks.
//!
//! This crate owns every allocation decision; [`heaparena-abi`] is a thin
//! `extern "C"` skin translating [`AllocError`] into the usual `NULL` +
//! `errno` contract.

mod arena;
mod block;
mod block_manager;
mod diagnostics;
mod error;
mod front;
mod log;
mod page;
mod registry;

pub use diagnostics::{InvariantReport, check_invariants, diagnose};
pub use error::AllocError;
pub use front::Allocator;
pub use log::{AllocatorEvent, EventLevel};
pub use page::{PageProvider, SystemPageProvider, page_size};

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;

struct HeapCell(UnsafeCell<Allocator<SystemPageProvider>>);

// SAFETY: the only access to the inner `Allocator` goes through
// `with_allocator`, which holds the surrounding `ReentrantMutex` for the
// whole closure call, serializing every access across threads (including
// the reentrant resize-calls-allocate-and-release case on the same
// thread).
#[allow(unsafe_code)]
unsafe impl Sync for HeapCell {}

fn heap() -> &'static ReentrantMutex<HeapCell> {
    static HEAP: OnceLock<ReentrantMutex<HeapCell>> = OnceLock::new();
    HEAP.get_or_init(|| ReentrantMutex::new(HeapCell(UnsafeCell::new(Allocator::new(SystemPageProvider)))))
}

/// Runs `f` against the process-wide allocator, holding the heap lock for
/// the duration of the call. The lock is reentrant so a caller already
/// holding it from an outer `with_allocator` call (there is none today,
/// but ABI wrappers built on top of this one may legitimately nest) can
/// safely call in again from the same thread without deadlocking.
pub fn with_allocator<R>(f: impl FnOnce(&mut Allocator<SystemPageProvider>) -> R) -> R {
    let guard = heap().lock();
    // SAFETY: the reentrant mutex guarantees exclusive access across
    // threads, and reentrant acquisition on the same thread is sound
    // because `f` only ever holds the `&mut` for the duration of this call.
    let allocator = unsafe { &mut *guard.0.get() };
    f(allocator)
}

/// Allocates `size` bytes aligned to `alignment` from the process-wide heap.
pub fn allocate(size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
    with_allocator(|a| a.allocate(size, alignment))
}

/// Releases a pointer previously returned by [`allocate`], [`zero_allocate`],
/// or [`resize`].
pub fn release(ptr: NonNull<u8>) {
    with_allocator(|a| a.release(ptr))
}

/// Resizes a previously allocated block, possibly relocating it.
pub fn resize(ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
    with_allocator(|a| a.resize(ptr, new_size))
}

/// Allocates `count * elem_size` zeroed bytes.
pub fn zero_allocate(count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
    with_allocator(|a| a.zero_allocate(count, elem_size))
}
