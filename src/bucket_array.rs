//! Bucket array: the chain-of-chains storage layer underneath `ChainMap`.
//!
//! Owns every live entry. Knows nothing about the hasher or the rebuild
//! policy; callers hand it precomputed hashes and target capacities. All
//! positions are plain `(bucket, pos)` index pairs, which is what lets the
//! cursor layer stay `Copy` and resolve lazily against the map.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};

use smallvec::SmallVec;

/// An owned key/value pair. The key is write-once: nothing above this
/// module ever hands out `&mut K`.
#[derive(Debug, Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

/// One collision chain. Chains are short in the stable load-factor zone,
/// so the first entry is stored inline in the bucket array itself.
pub(crate) type Chain<K, V> = SmallVec<[Entry<K, V>; 1]>;

/// Maps a hash to a bucket index under `capacity` buckets.
pub(crate) fn bucket_index(hash: u64, capacity: usize) -> usize {
    debug_assert!(capacity > 0);
    (hash % capacity as u64) as usize
}

#[derive(Debug)]
pub(crate) struct BucketArray<K, V> {
    chains: Vec<Chain<K, V>>,
}

impl<K, V> BucketArray<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        let mut chains = Vec::with_capacity(capacity);
        chains.resize_with(capacity, Chain::new);
        Self { chains }
    }

    /// Number of buckets, not entries.
    pub(crate) fn capacity(&self) -> usize {
        self.chains.len()
    }

    pub(crate) fn chain(&self, bucket: usize) -> &Chain<K, V> {
        &self.chains[bucket]
    }

    /// Position of the entry with key `q` inside `bucket`'s chain.
    pub(crate) fn scan<Q>(&self, bucket: usize, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.chains[bucket].iter().position(|e| e.key.borrow() == q)
    }

    /// Appends to the end of `bucket`'s chain; newest entries sit last.
    pub(crate) fn push(&mut self, bucket: usize, entry: Entry<K, V>) {
        self.chains[bucket].push(entry);
    }

    /// Removes the entry at `(bucket, pos)`, shifting later chain positions
    /// down by one.
    pub(crate) fn remove_at(&mut self, bucket: usize, pos: usize) -> Entry<K, V> {
        self.chains[bucket].remove(pos)
    }

    pub(crate) fn entry_at(&self, bucket: usize, pos: usize) -> Option<&Entry<K, V>> {
        self.chains.get(bucket).and_then(|c| c.get(pos))
    }

    pub(crate) fn entry_at_mut(&mut self, bucket: usize, pos: usize) -> Option<&mut Entry<K, V>> {
        self.chains.get_mut(bucket).and_then(|c| c.get_mut(pos))
    }

    /// First occupied position at `bucket` or later, else the end sentinel
    /// `(capacity, 0)`.
    pub(crate) fn first_occupied_from(&self, mut bucket: usize) -> (usize, usize) {
        while bucket < self.capacity() && self.chains[bucket].is_empty() {
            bucket += 1;
        }
        (bucket, 0)
    }

    /// Position following `(bucket, pos)` in traversal order: next slot in
    /// the same chain, then the first non-empty chain at a higher bucket
    /// index, else the end sentinel.
    pub(crate) fn step(&self, bucket: usize, mut pos: usize) -> (usize, usize) {
        debug_assert!(bucket < self.capacity());
        pos += 1;
        if pos < self.chains[bucket].len() {
            (bucket, pos)
        } else {
            self.first_occupied_from(bucket + 1)
        }
    }

    /// Drops every entry, keeping the current bucket count.
    pub(crate) fn clear(&mut self) {
        for chain in &mut self.chains {
            chain.clear();
        }
    }

    /// Total redistribution into a fresh array of `new_capacity` buckets.
    /// Every surviving entry is moved exactly once; relative order within a
    /// source chain is preserved on the way out.
    pub(crate) fn rebuild<S>(&mut self, new_capacity: usize, hasher: &S)
    where
        K: Hash,
        S: BuildHasher,
    {
        let mut next: Vec<Chain<K, V>> = Vec::with_capacity(new_capacity);
        next.resize_with(new_capacity, Chain::new);
        for chain in self.chains.drain(..) {
            for entry in chain {
                let bucket = bucket_index(hasher.hash_one(&entry.key), new_capacity);
                next[bucket].push(entry);
            }
        }
        self.chains = next;
    }

    pub(crate) fn into_chains(self) -> Vec<Chain<K, V>> {
        self.chains
    }

    pub(crate) fn chains(&self) -> &[Chain<K, V>] {
        &self.chains
    }

    pub(crate) fn chains_mut(&mut self) -> &mut [Chain<K, V>] {
        &mut self.chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    fn entry(key: u32, value: &str) -> Entry<u32, String> {
        Entry {
            key,
            value: value.to_string(),
        }
    }

    /// Invariant: `scan` finds an entry only in the bucket it was pushed
    /// into, and positions reflect push order.
    #[test]
    fn scan_and_push_order() {
        let mut b: BucketArray<u32, String> = BucketArray::with_capacity(4);
        b.push(1, entry(5, "a"));
        b.push(1, entry(9, "b"));
        assert_eq!(b.scan(1, &5), Some(0));
        assert_eq!(b.scan(1, &9), Some(1));
        assert_eq!(b.scan(1, &13), None);
        assert_eq!(b.scan(2, &5), None);
    }

    /// Invariant: `remove_at` shifts later positions down; the surviving
    /// entry is still reachable at its new position.
    #[test]
    fn remove_shifts_positions() {
        let mut b: BucketArray<u32, String> = BucketArray::with_capacity(2);
        b.push(0, entry(0, "a"));
        b.push(0, entry(2, "b"));
        b.push(0, entry(4, "c"));
        let removed = b.remove_at(0, 1);
        assert_eq!(removed.key, 2);
        assert_eq!(b.scan(0, &0), Some(0));
        assert_eq!(b.scan(0, &4), Some(1));
    }

    /// Invariant: traversal visits every entry exactly once, skipping empty
    /// chains, and terminates at the `(capacity, 0)` sentinel.
    #[test]
    fn step_skips_empty_chains() {
        let mut b: BucketArray<u32, String> = BucketArray::with_capacity(5);
        b.push(1, entry(1, "a"));
        b.push(1, entry(6, "b"));
        b.push(4, entry(4, "c"));

        let mut seen = Vec::new();
        let (mut bucket, mut pos) = b.first_occupied_from(0);
        while bucket < b.capacity() {
            seen.push(b.entry_at(bucket, pos).unwrap().key);
            let next = b.step(bucket, pos);
            bucket = next.0;
            pos = next.1;
        }
        assert_eq!(seen, vec![1, 6, 4]);
        assert_eq!((bucket, pos), (5, 0));
    }

    /// Invariant: an empty array's first occupied position is the sentinel.
    #[test]
    fn empty_array_traversal() {
        let b: BucketArray<u32, String> = BucketArray::with_capacity(3);
        assert_eq!(b.first_occupied_from(0), (3, 0));
    }

    /// Invariant: rebuild relocates every entry to `hash % new_capacity`
    /// and neither drops nor duplicates any of them.
    #[test]
    fn rebuild_is_total() {
        let hasher = RandomState::new();
        let mut b: BucketArray<u32, String> = BucketArray::with_capacity(2);
        for k in 0..16u32 {
            let bucket = bucket_index(hasher.hash_one(k), b.capacity());
            b.push(bucket, entry(k, "v"));
        }
        b.rebuild(7, &hasher);
        assert_eq!(b.capacity(), 7);

        let mut count = 0;
        for (i, chain) in b.chains().iter().enumerate() {
            for e in chain {
                assert_eq!(bucket_index(hasher.hash_one(e.key), 7), i);
                count += 1;
            }
        }
        assert_eq!(count, 16);
    }
}
