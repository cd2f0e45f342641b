//! Arena header layout and lifecycle.
//!
//! An arena is a single contiguous mapping: its header, followed immediately
//! by a dense run of blocks covering exactly the rest of the mapping. The
//! header's own `first_block` field *is* the first of those blocks; nothing
//! separates them.

use std::ptr::NonNull;

use crate::block::BlockHeader;

#[repr(C)]
pub struct ArenaHeader {
    registry_next: Option<NonNull<ArenaHeader>>,
    registry_prev: Option<NonNull<ArenaHeader>>,
    free_list_head: Option<NonNull<BlockHeader>>,
    mapping_size: usize,
    payload_bytes: usize,
    first_block: BlockHeader,
}

pub const ARENA_HEADER_SIZE: usize = std::mem::size_of::<ArenaHeader>();

impl ArenaHeader {
    /// Initializes a freshly mapped region as a new, unlinked arena with
    /// one free block spanning its entire payload area.
    ///
    /// # Safety
    /// `mapping` must point to at least `mapping_size` writable bytes, and
    /// `mapping_size` must be strictly greater than `ARENA_HEADER_SIZE`.
    pub unsafe fn init(mapping: NonNull<u8>, mapping_size: usize) -> NonNull<ArenaHeader> {
        debug_assert!(mapping_size > ARENA_HEADER_SIZE);
        let arena = mapping.cast::<ArenaHeader>();
        let payload_bytes = mapping_size - ARENA_HEADER_SIZE;

        // SAFETY: partial initialization through raw field pointers; every
        // field except `first_block` is written here, and `first_block`'s
        // bytes are written next via `BlockHeader::init_free`, so the whole
        // struct is initialized before anyone reads it as `&ArenaHeader`.
        unsafe {
            std::ptr::addr_of_mut!((*arena.as_ptr()).registry_next).write(None);
            std::ptr::addr_of_mut!((*arena.as_ptr()).registry_prev).write(None);
            std::ptr::addr_of_mut!((*arena.as_ptr()).mapping_size).write(mapping_size);
            std::ptr::addr_of_mut!((*arena.as_ptr()).payload_bytes).write(payload_bytes);
        }

        let first_block = Self::first_block_ptr(arena);
        unsafe {
            BlockHeader::init_free(first_block.cast(), payload_bytes);
            std::ptr::addr_of_mut!((*arena.as_ptr()).free_list_head).write(Some(first_block));
        }
        arena
    }

    #[inline]
    pub fn mapping_size(&self) -> usize {
        self.mapping_size
    }

    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    #[inline]
    pub fn registry_next(&self) -> Option<NonNull<ArenaHeader>> {
        self.registry_next
    }

    #[inline]
    pub fn registry_prev(&self) -> Option<NonNull<ArenaHeader>> {
        self.registry_prev
    }

    #[inline]
    pub fn set_registry_next(&mut self, next: Option<NonNull<ArenaHeader>>) {
        self.registry_next = next;
    }

    #[inline]
    pub fn set_registry_prev(&mut self, prev: Option<NonNull<ArenaHeader>>) {
        self.registry_prev = prev;
    }

    #[inline]
    pub fn free_list_head(&self) -> Option<NonNull<BlockHeader>> {
        self.free_list_head
    }

    #[inline]
    pub fn set_free_list_head(&mut self, head: Option<NonNull<BlockHeader>>) {
        self.free_list_head = head;
    }

    /// Pointer to the embedded first block of this arena.
    pub fn first_block_ptr(arena: NonNull<ArenaHeader>) -> NonNull<BlockHeader> {
        let offset = std::mem::offset_of!(ArenaHeader, first_block);
        // SAFETY: `first_block` is a field of `*arena`, always in bounds.
        unsafe { NonNull::new_unchecked(arena.as_ptr().cast::<u8>().add(offset).cast()) }
    }

    #[inline]
    pub fn start(arena: NonNull<ArenaHeader>) -> *mut u8 {
        arena.as_ptr().cast()
    }

    /// First address past this arena's mapping.
    ///
    /// # Safety
    /// `arena` must point at a live, initialized arena header.
    pub unsafe fn end(arena: NonNull<ArenaHeader>) -> *mut u8 {
        let size = unsafe { arena.as_ref().mapping_size() };
        unsafe { Self::start(arena).add(size) }
    }

    /// Whether `addr` falls strictly inside this arena's mapping.
    ///
    /// # Safety
    /// `arena` must point at a live, initialized arena header.
    pub unsafe fn contains(arena: NonNull<ArenaHeader>, addr: usize) -> bool {
        let start = Self::start(arena) as usize;
        let end = unsafe { Self::end(arena) as usize };
        addr >= start && addr < end
    }
}
