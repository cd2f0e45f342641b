//! Block header layout.
//!
//! Every block begins with a small fixed header. The bytes immediately
//! following it (`HSIZE` bytes in) are interpreted one of two ways,
//! selected by the sign of `signed_size`:
//!
//! - free (`signed_size > 0`): the bytes hold this arena's free-list link.
//! - allocated (`signed_size < 0`): the bytes are the start of the caller's
//!   payload.
//!
//! `signed_size` is never zero; that is not a legal state. The overlay is
//! never a Rust `union` field on `BlockHeader` — it is written and read
//! through a raw pointer `HSIZE` bytes past the header, confined to the
//! handful of `unsafe fn`s below, so `BlockHeader` itself stays an ordinary,
//! safely constructible struct.

use std::mem::size_of;
use std::ptr::NonNull;

/// Minimum payload a caller may request; smaller requests are rounded up
/// to this so every free block has room for a free-list link.
pub const MIN_PAYLOAD: usize = 16;

#[repr(C)]
pub struct BlockHeader {
    list_next: Option<NonNull<BlockHeader>>,
    list_prev: Option<NonNull<BlockHeader>>,
    signed_size: isize,
}

/// Offset from a block's address to its payload (or free-list link) bytes.
pub const HSIZE: usize = size_of::<BlockHeader>();

#[repr(C)]
struct FreeLink {
    free_next: Option<NonNull<BlockHeader>>,
    free_prev: Option<NonNull<BlockHeader>>,
}

impl BlockHeader {
    /// Writes a fresh free-block header in place at `at`.
    ///
    /// # Safety
    /// `at` must be valid for writes of `HSIZE + payload_len` bytes.
    pub unsafe fn init_free(at: NonNull<u8>, payload_len: usize) -> NonNull<BlockHeader> {
        debug_assert!(payload_len > 0);
        let block = at.cast::<BlockHeader>();
        unsafe {
            block.as_ptr().write(BlockHeader {
                list_next: None,
                list_prev: None,
                signed_size: payload_len as isize,
            });
            Self::write_free_link(block, None, None);
        }
        block
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.signed_size > 0
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.signed_size.unsigned_abs()
    }

    #[inline]
    pub fn mark_free(&mut self, len: usize) {
        debug_assert!(len > 0);
        self.signed_size = len as isize;
    }

    #[inline]
    pub fn mark_allocated(&mut self, len: usize) {
        debug_assert!(len > 0);
        self.signed_size = -(len as isize);
    }

    #[inline]
    pub fn list_next(&self) -> Option<NonNull<BlockHeader>> {
        self.list_next
    }

    #[inline]
    pub fn list_prev(&self) -> Option<NonNull<BlockHeader>> {
        self.list_prev
    }

    #[inline]
    pub fn set_list_next(&mut self, next: Option<NonNull<BlockHeader>>) {
        self.list_next = next;
    }

    #[inline]
    pub fn set_list_prev(&mut self, prev: Option<NonNull<BlockHeader>>) {
        self.list_prev = prev;
    }

    /// The block's overlay region: its free-list link (while free) or its
    /// payload (while allocated) — same address either way.
    #[inline]
    pub fn overlay(block: NonNull<BlockHeader>) -> NonNull<u8> {
        // SAFETY: every block reserves at least MIN_PAYLOAD bytes past its
        // header, so HSIZE bytes in is always inside the block's mapping.
        unsafe { NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(HSIZE)) }
    }

    #[inline]
    pub fn payload(block: NonNull<BlockHeader>) -> NonNull<u8> {
        Self::overlay(block)
    }

    /// First address past this block's payload.
    ///
    /// # Safety
    /// `block` must point at a live, initialized block header.
    pub unsafe fn end(block: NonNull<BlockHeader>) -> NonNull<u8> {
        let len = unsafe { block.as_ref().payload_len() };
        unsafe { NonNull::new_unchecked(Self::overlay(block).as_ptr().add(len)) }
    }

    fn free_link(block: NonNull<BlockHeader>) -> *mut FreeLink {
        Self::overlay(block).as_ptr().cast()
    }

    /// # Safety
    /// `block` must currently be free.
    pub unsafe fn free_next(block: NonNull<BlockHeader>) -> Option<NonNull<BlockHeader>> {
        unsafe { (*Self::free_link(block)).free_next }
    }

    /// # Safety
    /// `block` must currently be free.
    pub unsafe fn free_prev(block: NonNull<BlockHeader>) -> Option<NonNull<BlockHeader>> {
        unsafe { (*Self::free_link(block)).free_prev }
    }

    /// # Safety
    /// `block` must currently be free.
    pub unsafe fn write_free_link(
        block: NonNull<BlockHeader>,
        next: Option<NonNull<BlockHeader>>,
        prev: Option<NonNull<BlockHeader>>,
    ) {
        unsafe {
            Self::free_link(block).write(FreeLink { free_next: next, free_prev: prev });
        }
    }

    /// # Safety
    /// `block` must currently be free.
    pub unsafe fn set_free_next(block: NonNull<BlockHeader>, next: Option<NonNull<BlockHeader>>) {
        unsafe {
            (*Self::free_link(block)).free_next = next;
        }
    }

    /// # Safety
    /// `block` must currently be free.
    pub unsafe fn set_free_prev(block: NonNull<BlockHeader>, prev: Option<NonNull<BlockHeader>>) {
        unsafe {
            (*Self::free_link(block)).free_prev = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsize_is_three_words() {
        assert_eq!(HSIZE, 3 * size_of::<usize>());
    }

    #[test]
    fn min_payload_fits_a_free_link() {
        assert!(MIN_PAYLOAD >= size_of::<FreeLink>());
    }

    #[test]
    fn init_free_round_trips_payload_len() {
        let mut buf = vec![0u8; HSIZE + 64];
        let at = NonNull::new(buf.as_mut_ptr()).unwrap();
        let block = unsafe { BlockHeader::init_free(at, 64) };
        unsafe {
            assert!(block.as_ref().is_free());
            assert_eq!(block.as_ref().payload_len(), 64);
            assert_eq!(BlockHeader::free_next(block), None);
            assert_eq!(BlockHeader::free_prev(block), None);
        }
    }

    #[test]
    fn mark_allocated_then_free_round_trips() {
        let mut buf = vec![0u8; HSIZE + 64];
        let at = NonNull::new(buf.as_mut_ptr()).unwrap();
        let mut block = unsafe { BlockHeader::init_free(at, 64) };
        unsafe {
            block.as_mut().mark_allocated(40);
            assert!(!block.as_ref().is_free());
            assert_eq!(block.as_ref().payload_len(), 40);
            block.as_mut().mark_free(40);
            assert!(block.as_ref().is_free());
        }
    }
}
