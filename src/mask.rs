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

//! Fixed-size, inline (no-heap) component bitset.
//!
//! Width is a const generic so embedders pick the narrowest backing that
//! covers the largest component id actually used in a build, instead of
//! paying for a heap-backed bitset (teacher idiom: `bitset.rs`'s
//! `Vec<u64>`, reworked here to be inline per spec.md §3).

use std::hash::{Hash, Hasher};

use crate::component::ComponentId;

/// Word count for the default mask width: `4 * 64 = 256` component ids,
/// enough for most builds without forcing the full 2048-bit worst case.
pub const DEFAULT_MASK_WORDS: usize = 4;

/// Word count covering the full `MAX_COMPONENT_TYPE_ID` range (2048 bits).
pub const FULL_MASK_WORDS: usize = 32;

/// A fixed-size bitset with one bit per component id, `W * 64` bits wide.
#[derive(Clone, Copy, Eq)]
pub struct ComponentMask<const W: usize = DEFAULT_MASK_WORDS> {
    words: [u64; W],
}

impl<const W: usize> Default for ComponentMask<W> {
    fn default() -> Self {
        Self { words: [0u64; W] }
    }
}

impl<const W: usize> PartialEq for ComponentMask<W> {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl<const W: usize> ComponentMask<W> {
    pub const CAPACITY: usize = W * 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `id` is outside this mask's width; callers are
    /// directed (spec.md §6) to pick a width where
    /// `capacity(mask) > max_component_id` so this should not trigger in
    /// a correctly configured build.
    pub fn set(&mut self, id: ComponentId) -> bool {
        let idx = id.0 as usize;
        if idx >= Self::CAPACITY {
            return false;
        }
        self.words[idx / 64] |= 1u64 << (idx % 64);
        true
    }

    pub fn clear(&mut self, id: ComponentId) {
        let idx = id.0 as usize;
        if idx < Self::CAPACITY {
            self.words[idx / 64] &= !(1u64 << (idx % 64));
        }
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        let idx = id.0 as usize;
        if idx >= Self::CAPACITY {
            return false;
        }
        (self.words[idx / 64] & (1u64 << (idx % 64))) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for i in 0..W {
            out.words[i] |= other.words[i];
        }
        out
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Self::default();
        for i in 0..W {
            out.words[i] = self.words[i] & other.words[i];
        }
        out
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (0..W).any(|i| self.words[i] & other.words[i] != 0)
    }

    /// `self ⊇ other`
    pub fn is_superset_of(&self, other: &Self) -> bool {
        (0..W).all(|i| (self.words[i] & other.words[i]) == other.words[i])
    }

    pub fn with(mut self, id: ComponentId) -> Self {
        self.set(id);
        self
    }

    pub fn without(mut self, id: ComponentId) -> Self {
        self.clear(id);
        self
    }

    /// Lowest and highest set bit ids, used by `Layout` to bound its
    /// dense `base_offset[]` array.
    pub fn bounds(&self) -> Option<(u16, u16)> {
        let min = self.ones().next()?;
        let max = self.ones().last()?;
        Some((min as u16, max as u16))
    }

    /// Iterate set component ids in ascending order — `Layout`'s packing
    /// loop and `Bundle`-style column registration both require this
    /// ordering for determinism (spec.md §4.2).
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    None
                } else {
                    let bit = w.trailing_zeros() as usize;
                    w &= w - 1;
                    Some(word_idx * 64 + bit)
                }
            })
        })
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Deterministic hash of the bitset content (used to seed
    /// [`HashedMask`] so map lookups never rehash the raw words).
    fn content_hash(&self) -> u64 {
        // FNV-1a over the words; fast, stable across runs (spec.md §9).
        let mut hash: u64 = 0xcbf29ce484222325;
        for &w in &self.words {
            hash ^= w;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl<const W: usize> Hash for ComponentMask<W> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

impl<const W: usize> std::fmt::Debug for ComponentMask<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentMask{:?}", self.ones().collect::<Vec<_>>())
    }
}

/// Default mask width used by the crate's public API.
pub type Mask = ComponentMask<DEFAULT_MASK_WORDS>;

/// A mask paired with its eagerly-computed hash, so hash-map lookups
/// (archetype interning, query-description interning) never recompute the
/// hash over the raw words (spec.md §9 "Hashed keys").
#[derive(Clone, Copy, Eq)]
pub struct HashedMask<const W: usize = DEFAULT_MASK_WORDS> {
    pub mask: ComponentMask<W>,
    hash: u64,
}

impl<const W: usize> HashedMask<W> {
    pub fn new(mask: ComponentMask<W>) -> Self {
        let hash = mask.content_hash();
        Self { mask, hash }
    }
}

impl<const W: usize> PartialEq for HashedMask<W> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.mask == other.mask
    }
}

impl<const W: usize> Hash for HashedMask<W> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl<const W: usize> std::fmt::Debug for HashedMask<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.mask.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_contains() {
        let mut m = Mask::new();
        assert!(m.set(ComponentId(5)));
        assert!(m.contains(ComponentId(5)));
        assert!(!m.contains(ComponentId(6)));
    }

    #[test]
    fn union_and_intersection() {
        let a = Mask::new().with(ComponentId(1)).with(ComponentId(2));
        let b = Mask::new().with(ComponentId(2)).with(ComponentId(3));
        let u = a.union(&b);
        assert!(u.contains(ComponentId(1)) && u.contains(ComponentId(2)) && u.contains(ComponentId(3)));
        let i = a.intersection(&b);
        assert!(i.contains(ComponentId(2)));
        assert!(!i.contains(ComponentId(1)));
    }

    #[test]
    fn superset_matches_query_semantics() {
        let archetype = Mask::new().with(ComponentId(1)).with(ComponentId(2));
        let all = Mask::new().with(ComponentId(1));
        assert!(archetype.is_superset_of(&all));
    }

    #[test]
    fn ones_are_ascending() {
        let m = Mask::new().with(ComponentId(70)).with(ComponentId(3)).with(ComponentId(64));
        let v: Vec<_> = m.ones().collect();
        assert_eq!(v, vec![3, 64, 70]);
    }

    #[test]
    fn out_of_capacity_set_is_rejected() {
        let mut m = Mask::new();
        assert!(!m.set(ComponentId((Mask::CAPACITY) as u16)));
    }

    #[test]
    fn hashed_mask_equal_masks_equal_hash() {
        let a = HashedMask::new(Mask::new().with(ComponentId(9)));
        let b = HashedMask::new(Mask::new().with(ComponentId(9)));
        assert_eq!(a, b);
        use std::collections::hash_map::DefaultHasher;
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }
}
