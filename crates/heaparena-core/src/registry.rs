//! Process-wide registry of live arenas: a doubly-linked list, newest
//! first, traversed on allocation fit-search and on address lookup.

use std::ptr::NonNull;

use crate::arena::ArenaHeader;

pub struct ArenaRegistry {
    head: Option<NonNull<ArenaHeader>>,
}

impl ArenaRegistry {
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn head(&self) -> Option<NonNull<ArenaHeader>> {
        self.head
    }

    /// Links a freshly initialized arena at the head of the registry.
    ///
    /// # Safety
    /// `arena` must be unlinked and not already present in this registry.
    pub unsafe fn insert_head(&mut self, mut arena: NonNull<ArenaHeader>) {
        unsafe {
            arena.as_mut().set_registry_next(self.head);
            arena.as_mut().set_registry_prev(None);
            if let Some(mut old_head) = self.head {
                old_head.as_mut().set_registry_prev(Some(arena));
            }
        }
        self.head = Some(arena);
    }

    /// Unlinks `arena` from the registry.
    ///
    /// # Safety
    /// `arena` must currently be linked into this registry.
    pub unsafe fn remove(&mut self, arena: NonNull<ArenaHeader>) {
        unsafe {
            let (prev, next) = {
                let a = arena.as_ref();
                (a.registry_prev(), a.registry_next())
            };
            match prev {
                Some(mut p) => p.as_mut().set_registry_next(next),
                None => self.head = next,
            }
            if let Some(mut n) = next {
                n.as_mut().set_registry_prev(prev);
            }
        }
    }

    pub fn iter(&self) -> RegistryIter {
        RegistryIter { next: self.head }
    }

    /// Finds the arena whose mapping contains `addr`, if any.
    pub fn find_containing(&self, addr: usize) -> Option<NonNull<ArenaHeader>> {
        // SAFETY: every arena reachable from `head` is a live, initialized
        // arena linked by this registry.
        self.iter().find(|&arena| unsafe { ArenaHeader::contains(arena, addr) })
    }
}

pub struct RegistryIter {
    next: Option<NonNull<ArenaHeader>>,
}

impl Iterator for RegistryIter {
    type Item = NonNull<ArenaHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        // SAFETY: `current` is a live arena linked into the registry.
        self.next = unsafe { current.as_ref().registry_next() };
        Some(current)
    }
}
