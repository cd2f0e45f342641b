//! Thread-local `errno` storage backing the POSIX allocation contract.
//!
//! No locking, no routing through the core: this is a pure per-thread
//! accessor, the same shape used for `<errno.h>` elsewhere in the
//! depended-upon stack.

use std::cell::Cell;
use std::ffi::c_int;

thread_local! {
    static ERRNO: Cell<c_int> = const { Cell::new(0) };
}

pub(crate) fn set_errno(value: c_int) {
    ERRNO.with(|cell| cell.set(value));
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __errno_location() -> *mut c_int {
    ERRNO.with(|cell| cell.as_ptr())
}
