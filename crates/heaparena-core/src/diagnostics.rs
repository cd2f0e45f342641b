//! Human-readable heap dump, for debugging and for the ABI's
//! `malloc_stats`-style export. Never touches allocator state; purely a
//! read-only walk over the arena registry.

use std::io::{self, Write};

use crate::arena::ArenaHeader;
use crate::block::BlockHeader;
use crate::front::Allocator;
use crate::page::PageProvider;

/// Writes a summary of every arena and block to `out`.
pub fn diagnose<P: PageProvider>(allocator: &Allocator<P>, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "heaparena: {} arena(s), {} bytes free", allocator.arena_count(), allocator.free_memory())?;
    for (index, arena) in allocator.registry().iter().enumerate() {
        // SAFETY: every arena reachable from the registry is live.
        unsafe { diagnose_arena(index, arena, out)? };
    }
    Ok(())
}

/// Counts of locally observable invariant violations across every arena,
/// for use by tests driving a randomized operation trace. `diagnose`
/// reports the same kinds of violations as text; this is the same walk,
/// aggregated into counters a test can assert on directly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvariantReport {
    pub adjacent_free_pairs: usize,
    pub address_gaps: usize,
    pub trailing_gaps: usize,
    pub free_list_membership_mismatches: usize,
    pub recorded_free_memory: usize,
    pub computed_free_memory: usize,
}

impl InvariantReport {
    pub fn is_clean(&self) -> bool {
        self.adjacent_free_pairs == 0
            && self.address_gaps == 0
            && self.trailing_gaps == 0
            && self.free_list_membership_mismatches == 0
            && self.recorded_free_memory == self.computed_free_memory
    }
}

/// Walks every arena's block list and free list and checks, without
/// mutating anything, that: the block list covers the arena with no gaps
/// (coverage), no two adjacent blocks are both free (no-adjacent-free),
/// the free list contains exactly the blocks the block list marks free
/// (membership), and the recorded free-byte counter equals the sum of
/// free block payloads (accounting).
pub fn check_invariants<P: PageProvider>(allocator: &Allocator<P>) -> InvariantReport {
    let mut report = InvariantReport { recorded_free_memory: allocator.free_memory(), ..InvariantReport::default() };
    for arena in allocator.registry().iter() {
        // SAFETY: every arena reachable from the registry is live.
        unsafe { check_arena_invariants(arena, &mut report) };
    }
    report
}

unsafe fn check_arena_invariants(arena: std::ptr::NonNull<ArenaHeader>, report: &mut InvariantReport) {
    use std::collections::HashSet;

    unsafe {
        let first = ArenaHeader::first_block_ptr(arena);
        let mut cursor = Some(first);
        let mut prev_was_free = false;
        let mut last_end = first.as_ptr().cast::<u8>();
        let mut free_in_block_list = HashSet::new();

        while let Some(block) = cursor {
            let b = block.as_ref();
            if b.is_free() {
                report.computed_free_memory += b.payload_len();
                free_in_block_list.insert(block.as_ptr() as usize);
                if prev_was_free {
                    report.adjacent_free_pairs += 1;
                }
            }
            if block.as_ptr().cast::<u8>() != last_end {
                report.address_gaps += 1;
            }
            last_end = BlockHeader::end(block).as_ptr();
            prev_was_free = b.is_free();
            cursor = b.list_next();
        }
        if last_end != ArenaHeader::end(arena) {
            report.trailing_gaps += 1;
        }

        let mut free_in_free_list = HashSet::new();
        let mut free_cursor = arena.as_ref().free_list_head();
        while let Some(node) = free_cursor {
            if !node.as_ref().is_free() {
                report.free_list_membership_mismatches += 1;
            }
            free_in_free_list.insert(node.as_ptr() as usize);
            free_cursor = BlockHeader::free_next(node);
        }
        report.free_list_membership_mismatches += free_in_free_list.symmetric_difference(&free_in_block_list).count();
    }
}

unsafe fn diagnose_arena(index: usize, arena: std::ptr::NonNull<ArenaHeader>, out: &mut dyn Write) -> io::Result<()> {
    unsafe {
        let a = arena.as_ref();
        writeln!(
            out,
            "arena[{index}] at {:p}: mapping={} payload={}",
            ArenaHeader::start(arena),
            a.mapping_size(),
            a.payload_bytes(),
        )?;

        let first = ArenaHeader::first_block_ptr(arena);
        let mut cursor = Some(first);
        let mut prev_was_free = false;
        let mut last_end = first.as_ptr().cast::<u8>();
        while let Some(block) = cursor {
            let b = block.as_ref();
            let state = if b.is_free() { "free" } else { "used" };
            writeln!(out, "  block at {:p}: {state} len={}", block.as_ptr(), b.payload_len())?;
            if b.is_free() && prev_was_free {
                writeln!(out, "  ! adjacent free blocks were not coalesced")?;
            }
            if block.as_ptr().cast::<u8>() != last_end {
                writeln!(out, "  ! gap in the address-ordered block list")?;
            }
            last_end = BlockHeader::end(block).as_ptr();
            prev_was_free = b.is_free();
            cursor = b.list_next();
        }

        if last_end != ArenaHeader::end(arena) {
            writeln!(out, "  ! block list does not reach the end of the arena")?;
        }
        Ok(())
    }
}
