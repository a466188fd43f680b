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

//! Lock-free-fast-path, append-only chunked list (spec.md §5 "detail").
//!
//! Shared primitive behind `ChunkManager`'s metadata table and
//! `EntityManager`'s slot table: storage is an array of arrays of `T` with
//! power-of-two block size, growth allocates new blocks, existing blocks
//! are never relocated. `push` reserves a slot with a CAS, writes into it,
//! marks it ready, then advances a monotonically non-decreasing
//! `committed` counter so readers never observe a half-written slot.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;

const DEFAULT_BLOCK_CAPACITY: usize = 1024;

struct Block<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    ready: Box<[AtomicU64]>,
}

// SAFETY: access to `slots` is only ever through indices that the
// ready-bitmap / committed-counter protocol has proven exclusive
// (reserved by exactly one `fetch_add` winner) or already-committed
// (read-only thereafter).
unsafe impl<T: Send> Send for Block<T> {}
unsafe impl<T: Send> Sync for Block<T> {}

impl<T> Block<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        let ready_words = capacity.div_ceil(64);
        let mut ready = Vec::with_capacity(ready_words);
        for _ in 0..ready_words {
            ready.push(AtomicU64::new(0));
        }
        Self {
            slots: slots.into_boxed_slice(),
            ready: ready.into_boxed_slice(),
        }
    }

    fn is_ready(&self, slot: usize) -> bool {
        let word = self.ready[slot / 64].load(Ordering::Acquire);
        (word & (1u64 << (slot % 64))) != 0
    }

    fn mark_ready(&self, slot: usize) {
        self.ready[slot / 64].fetch_or(1u64 << (slot % 64), Ordering::AcqRel);
    }
}

/// Append-only chunked list. Readers never observe values above
/// `committed`; growth never moves previously written data.
pub struct AppendList<T> {
    block_capacity: usize,
    blocks: RwLock<Vec<Arc<Block<T>>>>,
    reserved: CachePadded<AtomicUsize>,
    committed: CachePadded<AtomicUsize>,
}

impl<T> Default for AppendList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AppendList<T> {
    pub fn new() -> Self {
        Self::with_block_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity.is_power_of_two(), "block_capacity must be a power of two");
        Self {
            block_capacity,
            blocks: RwLock::new(Vec::new()),
            reserved: CachePadded::new(AtomicUsize::new(0)),
            committed: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Number of elements visible to readers right now.
    pub fn committed_len(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    fn block_of(&self, block_idx: usize) -> Arc<Block<T>> {
        {
            let blocks = self.blocks.read();
            if let Some(b) = blocks.get(block_idx) {
                return b.clone();
            }
        }
        // Slow path: grow under a short exclusive lock, double-checked.
        let mut blocks = self.blocks.write();
        while blocks.len() <= block_idx {
            blocks.push(Arc::new(Block::new(self.block_capacity)));
        }
        blocks[block_idx].clone()
    }

    /// Reserve a slot, write `value` into it, publish it, and return its
    /// index. Other producers may advance `committed` past the returned
    /// index before this call returns.
    pub fn push(&self, value: T) -> usize {
        let i = self.reserved.fetch_add(1, Ordering::AcqRel);
        let block_idx = i / self.block_capacity;
        let slot = i % self.block_capacity;
        let block = self.block_of(block_idx);

        // SAFETY: slot `i` was exclusively reserved by this `fetch_add`;
        // no other producer writes to the same slot.
        unsafe {
            (*block.slots[slot].get()).write(value);
        }
        block.mark_ready(slot);

        self.advance_committed();

        // Spin until this index (or later) is committed.
        while self.committed.load(Ordering::Acquire) <= i {
            std::hint::spin_loop();
        }
        i
    }

    /// Scan consecutive ready slots starting at `committed` and publish
    /// the new watermark via CAS. Multiple producers may race here; only
    /// one successfully advances `committed` on each word, the rest
    /// observe the new value and return.
    fn advance_committed(&self) {
        loop {
            let current = self.committed.load(Ordering::Acquire);
            let reserved = self.reserved.load(Ordering::Acquire);
            if current >= reserved {
                return;
            }
            let block_idx = current / self.block_capacity;
            let slot = current % self.block_capacity;
            let blocks = self.blocks.read();
            let block = match blocks.get(block_idx) {
                Some(b) => b,
                None => return,
            };
            if !block.is_ready(slot) {
                return;
            }
            drop(blocks);
            if self
                .committed
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Someone else advanced it; loop and re-check.
                continue;
            }
        }
    }

    /// Read the element at `index`, or `None` if it has not been
    /// committed yet (or is out of range).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.committed_len() {
            return None;
        }
        let block_idx = index / self.block_capacity;
        let slot = index % self.block_capacity;
        let blocks = self.blocks.read();
        let block = blocks.get(block_idx)?;
        // SAFETY: index < committed_len(), so this slot has been written
        // and its ready bit observed before committed advanced past it.
        // Blocks are never removed or relocated once allocated, only
        // appended, so this reference outlives the read-lock guard.
        let ptr = block.slots[slot].get();
        Some(unsafe { (*ptr).assume_init_ref() })
    }

    pub fn is_empty(&self) -> bool {
        self.committed_len() == 0
    }
}

impl<T> Drop for AppendList<T> {
    fn drop(&mut self) {
        let committed = self.committed_len();
        let blocks = self.blocks.get_mut();
        for (block_idx, block) in blocks.iter_mut().enumerate() {
            let base = block_idx * self.block_capacity;
            if base >= committed {
                break;
            }
            let limit = (committed - base).min(self.block_capacity);
            if std::mem::needs_drop::<T>() {
                for slot in 0..limit {
                    unsafe {
                        (*block.slots[slot].get()).assume_init_drop();
                    }
                }
            }
        }
    }
}
