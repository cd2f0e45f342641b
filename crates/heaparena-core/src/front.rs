//! Allocator Front: picks an arena (or makes one), owns the global
//! free-byte counter and the arena-retirement policy, and keeps a bounded
//! lifecycle log of notable decisions.

use std::mem::size_of;
use std::ptr::NonNull;

use crate::arena::{ARENA_HEADER_SIZE, ArenaHeader};
use crate::block::{BlockHeader, HSIZE, MIN_PAYLOAD};
use crate::block_manager;
use crate::error::AllocError;
use crate::log::{EventLevel, LifecycleLog};
use crate::page::{PageProvider, SystemPageProvider, page_size};
use crate::registry::ArenaRegistry;

fn default_arena_size() -> usize {
    4 * page_size()
}

/// Requests whose `size + alignment` meet or exceed this many pages bypass
/// the fit-search entirely and get a dedicated arena.
const LARGE_REQUEST_PAGES: usize = 2;

/// Minimum free bytes across the process before an empty arena is retired.
const RETENTION_PAGES: usize = 8;

pub struct Allocator<P: PageProvider = SystemPageProvider> {
    registry: ArenaRegistry,
    free_memory: usize,
    log: LifecycleLog,
    pages: P,
}

// SAFETY: every field is only touched from within `with_allocator` (or a
// test holding the only reference to a freshly constructed `Allocator`),
// which serializes access behind a recursive mutex. No two threads ever
// observe this state concurrently, so the raw/NonNull pointers reachable
// from `registry` never alias across threads.
#[allow(unsafe_code)]
unsafe impl<P: PageProvider> Send for Allocator<P> {}

impl<P: PageProvider> Allocator<P> {
    pub const fn new(pages: P) -> Self {
        Self { registry: ArenaRegistry::new(), free_memory: 0, log: LifecycleLog::new(), pages }
    }

    pub fn free_memory(&self) -> usize {
        self.free_memory
    }

    pub fn registry(&self) -> &ArenaRegistry {
        &self.registry
    }

    pub fn events(&self) -> &[crate::log::AllocatorEvent] {
        self.log.events()
    }

    pub fn drain_events(&mut self) -> Vec<crate::log::AllocatorEvent> {
        self.log.drain()
    }

    pub fn arena_count(&self) -> usize {
        self.registry.iter().count()
    }

    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        validate_alignment(alignment)?;
        let size = size.max(MIN_PAYLOAD);

        if size + alignment >= LARGE_REQUEST_PAGES * page_size() {
            self.log.record(EventLevel::Info, "allocate", format!("large-request path, size={size}"));
            let block = self.allocate_large(size, alignment)?;
            return Ok(BlockHeader::payload(block));
        }

        for arena in self.registry.iter() {
            // SAFETY: `arena` is a live arena owned by this allocator.
            if let Some(block) = unsafe { block_manager::fit_in_arena(arena, &mut self.free_memory, size, alignment) } {
                return Ok(BlockHeader::payload(block));
            }
        }

        let arena = self.create_arena(default_arena_size())?;
        // SAFETY: a freshly created default-sized arena always has enough
        // room for a request below the large-request threshold.
        let block = unsafe { block_manager::fit_in_arena(arena, &mut self.free_memory, size, alignment) }
            .expect("a freshly created default arena always fits a non-large request");
        Ok(BlockHeader::payload(block))
    }

    fn allocate_large(&mut self, size: usize, alignment: usize) -> Result<NonNull<BlockHeader>, AllocError> {
        let page = page_size();
        // A large request always lands in a fresh arena's first block, so
        // `fit_in_arena` must take the `split` branch (the only one legal
        // on a first block) — size the mapping with that stricter margin,
        // not just `size + alignment`.
        let needed = size + alignment + MIN_PAYLOAD + HSIZE + ARENA_HEADER_SIZE;
        let default = default_arena_size();
        let arena_size = if needed < default { default } else { needed.div_ceil(page) * page };

        let arena = self.create_arena(arena_size)?;
        // SAFETY: this arena was sized specifically for this request.
        let block = unsafe { block_manager::fit_in_arena(arena, &mut self.free_memory, size, alignment) }
            .expect("an arena sized for this exact request always fits it");
        Ok(block)
    }

    fn create_arena(&mut self, size: usize) -> Result<NonNull<ArenaHeader>, AllocError> {
        let mapping = self.pages.map(size).map_err(|e| {
            self.log.record(EventLevel::Warn, "create_arena", format!("mmap failed for {size} bytes"));
            e
        })?;
        // SAFETY: `mapping` is exactly `size` fresh bytes from the page
        // provider.
        let arena = unsafe { ArenaHeader::init(mapping, size) };
        // SAFETY: `arena` was just initialized above.
        self.free_memory += unsafe { arena.as_ref().payload_bytes() };
        // SAFETY: `arena` is freshly initialized and unlinked.
        unsafe { self.registry.insert_head(arena) };
        self.log.record(EventLevel::Info, "create_arena", format!("mapped {size} bytes"));
        Ok(arena)
    }

    pub fn release(&mut self, ptr: NonNull<u8>) {
        let Some(arena) = self.registry.find_containing(ptr.as_ptr() as usize) else {
            self.log.record(EventLevel::Warn, "release", "pointer does not belong to any arena".to_string());
            return;
        };
        // SAFETY: `ptr` came from a prior `allocate`/`resize`, so it is
        // `HSIZE` bytes past a live block header.
        let block = unsafe { block_from_payload(ptr) };
        // SAFETY: `block` is a live block header.
        if unsafe { block.as_ref().is_free() } {
            self.log.record(EventLevel::Warn, "release", "double free ignored".to_string());
            return;
        }
        self.release_block(arena, block);
    }

    /// Marks `block` free and retires its arena if that crosses the
    /// retention threshold. `block` must be allocated and belong to `arena`.
    fn release_block(&mut self, arena: NonNull<ArenaHeader>, block: NonNull<BlockHeader>) {
        // SAFETY: caller guarantees `block` is allocated and belongs to `arena`.
        let retire = unsafe { block_manager::release(arena, &mut self.free_memory, block) };
        if retire && self.free_memory >= RETENTION_PAGES * page_size() {
            self.retire_arena(arena);
        }
    }

    fn retire_arena(&mut self, arena: NonNull<ArenaHeader>) {
        // SAFETY: `arena` is live and linked into `self.registry`.
        let payload = unsafe { arena.as_ref().payload_bytes() };
        unsafe { self.registry.remove(arena) };
        self.free_memory -= payload;
        let size = unsafe { arena.as_ref().mapping_size() };
        let start = unsafe { NonNull::new_unchecked(ArenaHeader::start(arena)) };
        // SAFETY: `start`/`size` exactly match this arena's original mapping.
        unsafe { self.pages.unmap(start, size) };
        self.log.record(EventLevel::Info, "retire_arena", format!("unmapped {size} bytes"));
    }

    pub fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
        let Some(arena) = self.registry.find_containing(ptr.as_ptr() as usize) else {
            return Err(AllocError::UnknownPointer);
        };
        // SAFETY: `ptr` came from a prior allocation, so it is `HSIZE`
        // bytes past a live block header belonging to `arena`.
        let block = unsafe { block_from_payload(ptr) };

        if new_size == 0 {
            // Preserved quirk (see SPEC_FULL.md §9): releases the block
            // but still hands back the now-stale pointer rather than null.
            self.release_block(arena, block);
            return Ok(ptr);
        }
        let new_size = new_size.max(MIN_PAYLOAD);
        let old_size = unsafe { block.as_ref().payload_len() };

        if new_size < old_size {
            unsafe { block_manager::reduce(arena, &mut self.free_memory, block, new_size) };
            return Ok(ptr);
        }
        if new_size == old_size {
            return Ok(ptr);
        }

        let next = unsafe { block.as_ref().list_next() };
        let can_absorb = match next {
            Some(n) => unsafe { n.as_ref().is_free() && old_size + HSIZE + n.as_ref().payload_len() >= new_size },
            None => false,
        };

        if can_absorb {
            let next = next.unwrap();
            unsafe {
                block_manager::absorb_next(arena, &mut self.free_memory, block, next);
                block_manager::reduce(arena, &mut self.free_memory, block, new_size);
            }
            return Ok(ptr);
        }

        let new_ptr = self.allocate(new_size, size_of::<usize>())?;
        // SAFETY: `new_ptr` is a fresh allocation of at least `old_size`
        // bytes; `ptr` is a live allocation of exactly `old_size` bytes.
        unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size) };
        self.release(ptr);
        Ok(new_ptr)
    }

    pub fn zero_allocate(&mut self, count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
        // Overflow of `count * elem_size` is intentionally unguarded; see
        // SPEC_FULL.md §9.
        let total = count.wrapping_mul(elem_size);
        let ptr = self.allocate(total, size_of::<usize>())?;
        // SAFETY: `ptr` is a fresh allocation of at least `total` bytes.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, total) };
        Ok(ptr)
    }
}

unsafe fn block_from_payload(ptr: NonNull<u8>) -> NonNull<BlockHeader> {
    unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(HSIZE).cast()) }
}

fn validate_alignment(alignment: usize) -> Result<(), AllocError> {
    let ptr_width = size_of::<usize>();
    if alignment == 0 || !alignment.is_power_of_two() || alignment % ptr_width != 0 {
        return Err(AllocError::InvalidAlignment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let mut a = Allocator::new(SystemPageProvider);
        assert_eq!(a.allocate(64, 24).unwrap_err(), AllocError::InvalidAlignment);
    }

    #[test]
    fn rejects_alignment_not_a_multiple_of_pointer_width() {
        let mut a = Allocator::new(SystemPageProvider);
        assert_eq!(a.allocate(64, 4).unwrap_err(), AllocError::InvalidAlignment);
    }

    #[test]
    fn allocate_then_release_restores_free_memory_and_arena_count() {
        // A lone default-sized arena's free bytes sit below the retention
        // threshold, so the first allocate/release pair keeps it mapped
        // rather than retiring it — that is the retention policy, not a
        // violation. Warm up one arena first, then check the pair is a
        // no-op against that steady state.
        let mut a = Allocator::new(SystemPageProvider);
        let warmup = a.allocate(128, 8).unwrap();
        a.release(warmup);

        let before_arenas = a.arena_count();
        let before_free = a.free_memory();
        let ptr = a.allocate(128, 8).unwrap();
        a.release(ptr);
        assert_eq!(a.arena_count(), before_arenas);
        assert_eq!(a.free_memory(), before_free);
    }

    #[test]
    fn zero_allocate_zeros_the_whole_buffer() {
        let mut a = Allocator::new(SystemPageProvider);
        let ptr = a.zero_allocate(16, 8).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 128) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn resize_down_preserves_prefix() {
        let mut a = Allocator::new(SystemPageProvider);
        let ptr = a.allocate(256, 8).unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 7, 256) };
        let shrunk = a.resize(ptr, 32).unwrap();
        assert_eq!(shrunk, ptr);
        let bytes = unsafe { std::slice::from_raw_parts(shrunk.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 7));
    }

    #[test]
    fn resize_up_preserves_prefix_whether_or_not_relocated() {
        let mut a = Allocator::new(SystemPageProvider);
        let ptr = a.allocate(64, 8).unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 9, 64) };
        let grown = a.resize(ptr, 4096).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 9));
    }

    #[test]
    fn resize_to_zero_releases_but_still_returns_the_original_pointer() {
        // Preserved quirk: `resize(ptr, 0)` frees the block yet hands back
        // `ptr` rather than null.
        let mut a = Allocator::new(SystemPageProvider);
        let warmup = a.allocate(64, 8).unwrap();
        a.release(warmup);
        let before_free = a.free_memory();

        let ptr = a.allocate(64, 8).unwrap();
        let result = a.resize(ptr, 0).unwrap();
        assert_eq!(result, ptr);
        assert_eq!(a.free_memory(), before_free);
    }

    #[test]
    fn release_of_unknown_pointer_is_silently_ignored() {
        let mut a = Allocator::new(SystemPageProvider);
        let mut stack_value = 0u8;
        let bogus = NonNull::from(&mut stack_value);
        a.release(bogus);
    }

    #[test]
    fn double_release_is_silently_ignored() {
        let mut a = Allocator::new(SystemPageProvider);
        let ptr = a.allocate(64, 8).unwrap();
        a.release(ptr);
        a.release(ptr);
    }
}
