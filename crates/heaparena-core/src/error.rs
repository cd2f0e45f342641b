//! Error kinds surfaced by the allocator core.
//!
//! The ABI boundary translates these to the POSIX contract (EINVAL, ENOMEM,
//! null, thread-local errno); nothing here assumes a C caller.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("alignment must be a power of two and a multiple of the pointer width")]
    InvalidAlignment,
    #[error("the allocator could not satisfy the request")]
    OutOfMemory,
    #[error("pointer does not belong to any arena")]
    UnknownPointer,
}
