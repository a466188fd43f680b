// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chunked memory manager: hands out versioned handles to fixed-size
//! memory blocks and validates them.
//!
//! Raw storage is carved from a `bumpalo::Bump` arena (grounded on the
//! teacher pack's `zakarumych-alex` crate, which leans on `bumpalo` for
//! its own arena allocation): bump arenas never deallocate individual
//! objects, which matches this manager's recycling model — freed chunks
//! go on a CAS free-list and get reissued with a bumped generation rather
//! than truly freed.

use std::alloc::Layout;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bumpalo::Bump;
use parking_lot::Mutex;

use crate::append_list::AppendList;
use crate::error::{EcsError, Result};

/// Chunk generations are documented as "≥48 bits"; wraparound is a fatal
/// programming error (spec.md §9 Open Question (a)), not a recoverable
/// `Result::Err`.
const GENERATION_BITS: u32 = 48;
const MAX_GENERATION: u64 = (1u64 << GENERATION_BITS) - 1;

/// Byte alignment given to every chunk allocation. Must be at least the
/// largest alignment any component can declare (16, per spec.md §6).
/// Cache-line granularity is enough for the SoA columns inside a chunk;
/// spec.md only *suggests* page granularity ("implementations SHOULD"),
/// it does not require it.
const CHUNK_ALIGNMENT: usize = 64;

/// Opaque, externally-held reference to a chunk. Valid only while its
/// generation matches the manager's current generation for `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    pub id: u32,
    pub generation: u64,
}

/// Sentinel marking "no next free slot".
const FREE_LIST_NIL: usize = usize::MAX;

struct ChunkSlot {
    /// Raw pointer into the bump arena. Fixed for the lifetime of the
    /// manager once assigned; never reassigned, even across free/reuse
    /// cycles (the *block* is reused, only the handle's generation
    /// changes).
    ptr: AtomicUsize,
    generation: AtomicU64,
    /// Free-list intrusive link: index of the next free slot, or
    /// `FREE_LIST_NIL`.
    next_free: AtomicUsize,
}

// SAFETY: `ptr` always refers to a `chunk_size`-byte region inside the
// manager's own `Bump` arena, which outlives every handle derived from
// it; access is gated by the generation check in `get`/`free`.
unsafe impl Send for ChunkSlot {}
unsafe impl Sync for ChunkSlot {}

/// Pool of fixed-size raw memory blocks. Thread-safe; the allocation fast
/// path (handle id assignment) is a CAS loop on the free-list head.
pub struct ChunkManager {
    chunk_size: usize,
    arena: Mutex<Bump>,
    slots: AppendList<ChunkSlot>,
    free_head: AtomicUsize,
}

impl ChunkManager {
    /// `chunk_size` must be at least 256 bytes (spec.md §6).
    pub fn new(chunk_size: usize) -> Self {
        Self::with_capacity(chunk_size, 0)
    }

    /// Like [`Self::new`], but pre-reserves the backing arena for roughly
    /// `default_chunk_capacity` chunks (`WorldConfig::default_chunk_capacity`)
    /// so the first wave of allocations doesn't grow the arena piecemeal.
    pub fn with_capacity(chunk_size: usize, default_chunk_capacity: usize) -> Self {
        assert!(chunk_size >= 256, "chunk_size must be >= 256 bytes");
        let arena = if default_chunk_capacity > 0 {
            Bump::with_capacity(chunk_size * default_chunk_capacity + CHUNK_ALIGNMENT)
        } else {
            Bump::new()
        };
        Self {
            chunk_size,
            arena: Mutex::new(arena),
            slots: AppendList::new(),
            free_head: AtomicUsize::new(FREE_LIST_NIL),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hand out a zero-initialized chunk.
    pub fn allocate(&self) -> Result<ChunkHandle> {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            if head == FREE_LIST_NIL {
                break;
            }
            let slot = self
                .slots
                .get(head)
                .expect("free-list index must reference a committed slot");
            let next = slot.next_free.load(Ordering::Relaxed);
            if self
                .free_head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let generation = slot.generation.load(Ordering::Acquire);
                let ptr = slot.ptr.load(Ordering::Acquire) as *mut u8;
                self.zero(ptr);
                return Ok(ChunkHandle {
                    id: head as u32,
                    generation,
                });
            }
            // Lost the race for this slot; retry from the (possibly new) head.
        }

        // Free-list empty: carve a fresh block from the arena.
        let layout = Layout::from_size_align(self.chunk_size, CHUNK_ALIGNMENT)
            .expect("chunk_size/alignment must form a valid layout");
        let ptr = {
            let arena = self.arena.lock();
            arena
                .try_alloc_layout(layout)
                .map_err(|_| EcsError::OutOfMemory)?
        };
        let raw = ptr.as_ptr();
        self.zero(raw);

        let id = self.slots.push(ChunkSlot {
            ptr: AtomicUsize::new(raw as usize),
            generation: AtomicU64::new(0),
            next_free: AtomicUsize::new(FREE_LIST_NIL),
        });

        Ok(ChunkHandle {
            id: id as u32,
            generation: 0,
        })
    }

    fn zero(&self, ptr: *mut u8) {
        // SAFETY: `ptr` points at a `chunk_size`-byte allocation owned by
        // this manager's arena; no other reference to it is live (the
        // slot was just claimed off the free-list or freshly carved).
        unsafe {
            std::ptr::write_bytes(ptr, 0, self.chunk_size);
        }
    }

    /// Borrow the bytes behind `handle`. Fails with `StaleChunk` if the
    /// generation does not match.
    pub fn get(&self, handle: ChunkHandle) -> Result<&[u8]> {
        let slot = self
            .slots
            .get(handle.id as usize)
            .ok_or(EcsError::StaleChunk)?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(EcsError::StaleChunk);
        }
        let ptr = slot.ptr.load(Ordering::Acquire) as *const u8;
        // SAFETY: generation matched, so this handle currently owns the
        // block; the block is never relocated or given a shorter
        // lifetime than `self`.
        Ok(unsafe { std::slice::from_raw_parts(ptr, self.chunk_size) })
    }

    /// Mutably borrow the bytes behind `handle`.
    ///
    /// # Safety
    /// The caller must ensure no other live borrow of the same chunk
    /// exists (spec.md §5 "a ComponentRef borrowed out of a chunk MUST be
    /// returned before that chunk participates in another structural
    /// change").
    pub unsafe fn get_mut(&self, handle: ChunkHandle) -> Result<*mut u8> {
        let slot = self
            .slots
            .get(handle.id as usize)
            .ok_or(EcsError::StaleChunk)?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(EcsError::StaleChunk);
        }
        Ok(slot.ptr.load(Ordering::Acquire) as *mut u8)
    }

    /// Bump the generation for `handle`'s id and return the block to the
    /// free-list. Subsequent `get` calls with the old handle report
    /// stale.
    pub fn free(&self, handle: ChunkHandle) -> Result<()> {
        let slot = self
            .slots
            .get(handle.id as usize)
            .ok_or(EcsError::StaleChunk)?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(EcsError::StaleChunk);
        }

        let new_generation = handle.generation + 1;
        if new_generation > MAX_GENERATION {
            panic!(
                "chunk generation overflow for id {} (fatal per spec Open Question (a))",
                handle.id
            );
        }
        slot.generation.store(new_generation, Ordering::Release);

        loop {
            let head = self.free_head.load(Ordering::Acquire);
            slot.next_free.store(head, Ordering::Relaxed);
            if self
                .free_head
                .compare_exchange(head, handle.id as usize, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Diagnostic snapshot: total slots ever allocated and the current
    /// free-list depth (teacher idiom: `World::memory_stats`).
    pub fn stats(&self) -> ChunkManagerStats {
        let mut free_count = 0usize;
        let mut cursor = self.free_head.load(Ordering::Acquire);
        while cursor != FREE_LIST_NIL {
            free_count += 1;
            let slot = self.slots.get(cursor).expect("free-list must be well-formed");
            cursor = slot.next_free.load(Ordering::Acquire);
        }
        ChunkManagerStats {
            total_slots: self.slots.committed_len(),
            free_slots: free_count,
            chunk_size: self.chunk_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkManagerStats {
    pub total_slots: usize,
    pub free_slots: usize,
    pub chunk_size: usize,
}
