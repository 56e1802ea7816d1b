//! ChainMap: the public container, plus its cursor and iterator types.

use core::borrow::Borrow;
use core::cell::Cell;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::{Flatten, FusedIterator};
use core::slice;
use std::collections::hash_map::RandomState;

use thiserror::Error;

use crate::bucket_array::{bucket_index, BucketArray, Chain, Entry};
use crate::policy::RehashPolicy;

/// Error returned by the fail-fast accessors [`ChainMap::at`] and
/// [`ChainMap::at_mut`] when the requested key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("key not found")]
pub struct KeyNotFound;

/// Error returned when a [`Cursor`] is resolved against a map it no longer
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    /// The map rebuilt its bucket array (or removed an entry) after this
    /// cursor was issued, or the cursor was issued by a different map.
    #[error("cursor was invalidated by a rehash or removal")]
    Invalidated,
    /// The cursor sits at the end sentinel, which has no entry to expose.
    #[error("cursor is positioned at the end sentinel")]
    AtEnd,
}

/// Issues stamps that are unique within a thread, across all maps and all
/// rebuild eras. A cursor validates against a map iff their stamps match,
/// which covers both halves of the identity check at once: a cursor from
/// another map, or from before a rebuild, carries a stamp this map never
/// had or no longer has.
fn next_stamp() -> u64 {
    thread_local! {
        static NEXT_STAMP: Cell<u64> = const { Cell::new(1) };
    }
    NEXT_STAMP.with(|c| {
        let s = c.get();
        c.set(s.wrapping_add(1));
        s
    })
}

/// A separate-chaining hash map with an explicit rebuild policy.
///
/// Entries live in per-bucket collision chains inside a bucket array whose
/// size is governed by a [`RehashPolicy`]: after every mutating call the
/// policy is re-evaluated, and when it orders a rebuild every surviving
/// entry is moved into a freshly allocated array. Rebuilds (and removals)
/// invalidate previously issued [`Cursor`]s; stale cursors fail with a
/// checked [`CursorError`] instead of resolving to the wrong entry.
///
/// `insert` is first-write-wins: inserting a key that is already present
/// keeps the stored value and discards the new one. Callers that want
/// last-write-wins mutate through [`get_mut`](Self::get_mut) or
/// [`entry_or_default`](Self::entry_or_default) instead.
///
/// Single-threaded by design: no internal synchronization, external
/// locking required when shared across threads.
pub struct ChainMap<K, V, S = RandomState> {
    hasher: S,
    policy: RehashPolicy,
    buckets: BucketArray<K, V>,
    len: usize,
    stamp: u64,
}

impl<K, V> ChainMap<K, V>
where
    K: Eq + Hash,
{
    /// Empty map with the default hasher and the default policy.
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, V> Default for ChainMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainMap<K, V, S> {
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets currently allocated.
    pub fn capacity(&self) -> usize {
        self.buckets.capacity()
    }

    /// The hashing strategy supplied at construction.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn policy(&self) -> &RehashPolicy {
        &self.policy
    }

    /// Cursor at the first entry in traversal order, or the end sentinel
    /// for an empty map.
    pub fn begin(&self) -> Cursor {
        let (bucket, pos) = self.buckets.first_occupied_from(0);
        Cursor {
            stamp: self.stamp,
            bucket,
            pos,
        }
    }

    /// The end sentinel: one past the last bucket.
    pub fn end(&self) -> Cursor {
        Cursor {
            stamp: self.stamp,
            bucket: self.capacity(),
            pos: 0,
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.buckets.chains().iter().flatten(),
            remaining: self.len,
        }
    }

    /// Iterates with mutable access to values. Keys stay immutable.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.buckets.chains_mut().iter_mut().flatten(),
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

impl<K, V, S> ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Empty map with a custom hashing strategy and the default policy.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_hasher_and_policy(hasher, RehashPolicy::default())
    }

    /// Empty map with the default hasher and a custom policy.
    pub fn with_policy(policy: RehashPolicy) -> Self
    where
        S: Default,
    {
        Self::with_hasher_and_policy(Default::default(), policy)
    }

    pub fn with_hasher_and_policy(hasher: S, policy: RehashPolicy) -> Self {
        Self {
            hasher,
            policy,
            buckets: BucketArray::with_capacity(policy.min_capacity()),
            len: 0,
            stamp: next_stamp(),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    fn locate<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + Hash,
    {
        bucket_index(self.make_hash(q), self.capacity())
    }

    /// Re-evaluates the policy and rebuilds when it says so. A rebuild
    /// restamps the map even when the target capacity matches the current
    /// one; any policy-triggered rebuild invalidates outstanding cursors.
    fn run_policy(&mut self) {
        if !self.policy.needs_rebuild(self.len, self.capacity()) {
            return;
        }
        let target = self.policy.target_capacity(self.len);
        self.buckets.rebuild(target, &self.hasher);
        self.stamp = next_stamp();
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.locate(q);
        self.buckets.scan(bucket, q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.locate(q);
        let pos = self.buckets.scan(bucket, q)?;
        self.buckets.entry_at(bucket, pos).map(|e| &e.value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.locate(q);
        let pos = self.buckets.scan(bucket, q)?;
        self.buckets.entry_at_mut(bucket, pos).map(|e| &mut e.value)
    }

    /// Fail-fast lookup: the stored value or [`KeyNotFound`].
    pub fn at<Q>(&self, q: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(KeyNotFound)
    }

    /// Mutable variant of [`at`](Self::at); raises [`KeyNotFound`]
    /// identically.
    pub fn at_mut<Q>(&mut self, q: &Q) -> Result<&mut V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_mut(q).ok_or(KeyNotFound)
    }

    /// Cursor at the entry for `q`, or the end sentinel when absent.
    pub fn find<Q>(&self, q: &Q) -> Cursor
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.locate(q);
        match self.buckets.scan(bucket, q) {
            Some(pos) => Cursor {
                stamp: self.stamp,
                bucket,
                pos,
            },
            None => self.end(),
        }
    }

    /// First-write-wins insert.
    ///
    /// If `key` is absent, appends the entry to its chain, re-evaluates the
    /// policy, and returns `true`. If `key` is already present, the stored
    /// value is kept, `value` is dropped, and `false` is returned with the
    /// map untouched.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let bucket = self.locate(&key);
        if self.buckets.scan(bucket, &key).is_some() {
            return false;
        }
        self.buckets.push(bucket, Entry { key, value });
        self.len += 1;
        self.run_policy();
        true
    }

    /// Removes the entry for `q`, returning its value if one was present.
    ///
    /// The policy is re-evaluated whether or not a removal happened. A
    /// successful removal shifts later positions in the affected chain, so
    /// it invalidates outstanding cursors even when no rebuild follows.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.locate(q);
        let removed = self
            .buckets
            .scan(bucket, q)
            .map(|pos| self.buckets.remove_at(bucket, pos));
        if removed.is_some() {
            self.len -= 1;
            self.stamp = next_stamp();
        }
        self.run_policy();
        removed.map(|e| e.value)
    }

    /// Index-access analog: a mutable reference to the value for `key`,
    /// inserting `(key, V::default())` first when absent.
    pub fn entry_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let hash = self.make_hash(&key);
        let bucket = bucket_index(hash, self.capacity());
        match self.buckets.scan(bucket, &key) {
            Some(pos) => {
                &mut self
                    .buckets
                    .entry_at_mut(bucket, pos)
                    .expect("scanned position is live")
                    .value
            }
            None => {
                // Grow first so the fresh entry lands in its final bucket
                // and the returned borrow survives the policy run.
                self.len += 1;
                self.run_policy();
                let bucket = bucket_index(hash, self.capacity());
                self.buckets.push(
                    bucket,
                    Entry {
                        key,
                        value: V::default(),
                    },
                );
                let pos = self.buckets.chain(bucket).len() - 1;
                &mut self
                    .buckets
                    .entry_at_mut(bucket, pos)
                    .expect("entry was just pushed")
                    .value
            }
        }
    }

    /// Drops every entry and re-evaluates the policy, which shrinks the
    /// bucket array back to the policy's minimum capacity.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
        self.run_policy();
    }
}

impl<K, V, S> Clone for ChainMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Deep clone: entries are re-inserted into a fresh map started at the
    /// policy's minimum capacity, letting the policy grow it. The clone
    /// shares no storage with the original and gets its own stamp, so
    /// cursors never cross between the two.
    fn clone(&self) -> Self {
        let mut out = Self::with_hasher_and_policy(self.hasher.clone(), self.policy);
        for (k, v) in self.iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

impl<K, V, S> fmt::Debug for ChainMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Duplicate keys in the source resolve first-seen-wins, matching
    /// [`ChainMap::insert`].
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_hasher_and_policy(S::default(), RehashPolicy::default());
        map.extend(iter);
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ChainMap<K, V>
where
    K: Eq + Hash,
{
    /// Initializer-list analog: `ChainMap::from([(k, v), ...])`, duplicate
    /// keys resolving first-seen-wins.
    fn from(pairs: [(K, V); N]) -> Self {
        Self::from_iter(pairs)
    }
}

/// A detached position inside a [`ChainMap`]: `(bucket, pos)` plus the
/// stamp of the map era that issued it. Resolution happens lazily against
/// the map, in the same style as a handle: `cursor.value(&map)`.
///
/// The end sentinel is `bucket == capacity`. Two cursors are equal iff they
/// were issued by the same map era and reference the same position;
/// cursors from different maps or from before a rebuild never compare
/// equal and never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    stamp: u64,
    bucket: usize,
    pos: usize,
}

impl Cursor {
    fn check<K, V, S>(&self, map: &ChainMap<K, V, S>) -> Result<(), CursorError> {
        if self.stamp != map.stamp {
            return Err(CursorError::Invalidated);
        }
        Ok(())
    }

    /// True when this cursor sits at `map`'s end sentinel.
    pub fn is_end<K, V, S>(&self, map: &ChainMap<K, V, S>) -> Result<bool, CursorError> {
        self.check(map)?;
        Ok(self.bucket >= map.capacity())
    }

    /// Borrow the entry's key. Keys are never handed out mutably.
    pub fn key<'a, K, V, S>(&self, map: &'a ChainMap<K, V, S>) -> Result<&'a K, CursorError> {
        self.check(map)?;
        map.buckets
            .entry_at(self.bucket, self.pos)
            .map(|e| &e.key)
            .ok_or(CursorError::AtEnd)
    }

    /// Borrow the entry's value.
    pub fn value<'a, K, V, S>(&self, map: &'a ChainMap<K, V, S>) -> Result<&'a V, CursorError> {
        self.check(map)?;
        map.buckets
            .entry_at(self.bucket, self.pos)
            .map(|e| &e.value)
            .ok_or(CursorError::AtEnd)
    }

    /// Mutably borrow the entry's value.
    pub fn value_mut<'a, K, V, S>(
        &self,
        map: &'a mut ChainMap<K, V, S>,
    ) -> Result<&'a mut V, CursorError> {
        self.check(map)?;
        map.buckets
            .entry_at_mut(self.bucket, self.pos)
            .map(|e| &mut e.value)
            .ok_or(CursorError::AtEnd)
    }

    /// The cursor one step further in traversal order: the next position in
    /// the current chain, then the first non-empty chain at a higher bucket
    /// index, else the end sentinel. Advancing the end sentinel is an
    /// error.
    pub fn advance<K, V, S>(self, map: &ChainMap<K, V, S>) -> Result<Cursor, CursorError> {
        self.check(map)?;
        if self.bucket >= map.capacity() {
            return Err(CursorError::AtEnd);
        }
        let (bucket, pos) = map.buckets.step(self.bucket, self.pos);
        Ok(Cursor {
            stamp: self.stamp,
            bucket,
            pos,
        })
    }
}

/// Immutable entry iterator, in bucket order, skipping empty chains.
pub struct Iter<'a, K, V> {
    inner: Flatten<slice::Iter<'a, Chain<K, V>>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.inner.next()?;
        self.remaining -= 1;
        Some((&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Mutable entry iterator; values only, keys stay immutable.
pub struct IterMut<'a, K, V> {
    inner: Flatten<slice::IterMut<'a, Chain<K, V>>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.inner.next()?;
        self.remaining -= 1;
        Some((&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// Owning iterator; consumes the map and yields `(K, V)` pairs.
pub struct IntoIter<K, V> {
    inner: Flatten<std::vec::IntoIter<Chain<K, V>>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.inner.next()?;
        self.remaining -= 1;
        Some((e.key, e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

impl<'a, K, V, S> IntoIterator for &'a ChainMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut ChainMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, S> IntoIterator for ChainMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            remaining: self.len,
            inner: self.buckets.into_chains().into_iter().flatten(),
        }
    }
}
