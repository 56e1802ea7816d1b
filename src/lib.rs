//! chainmap: a separate-chaining hash map with an explicit rehash policy
//! and checked cursors.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the three nontrivial concerns of a chained hash table in
//!   separately verifiable layers: chain storage, capacity policy, and
//!   the cursor protocol over the sparse layout.
//! - Layers:
//!   - `bucket_array::BucketArray<K, V>`: owns every entry; a `Vec` of
//!     short inline chains, addressed by plain `(bucket, pos)` index
//!     pairs. Knows nothing about hashing strategy or sizing.
//!   - `policy::RehashPolicy`: pure arithmetic deciding when the bucket
//!     count must change and what to change it to. Re-evaluated after
//!     every mutating call; the same formula governs growth and shrink.
//!   - `map::ChainMap<K, V, S>`: the public container composing the two,
//!     plus `Cursor` and the borrowing iterators.
//!
//! Constraints
//! - Single-threaded: no internal synchronization; callers lock
//!   externally when sharing across threads.
//! - First-write-wins `insert`: a duplicate key keeps the stored value
//!   and discards the new one. Last-write-wins callers go through
//!   `get_mut` or `entry_or_default`.
//! - Keys are immutable post-insert; there is no `key_mut` anywhere.
//! - The policy invariant is restored synchronously before every mutating
//!   call returns; it is never observably violated between calls.
//!
//! Cursor invalidation
//! - `Cursor` is a detached `Copy` position resolved lazily against the
//!   map, so a rebuild cannot leave dangling references behind. Each map
//!   era carries a stamp (unique per thread, reissued on every rebuild or
//!   removal); resolving a cursor whose stamp no longer matches fails
//!   with `CursorError::Invalidated` instead of reading whatever moved
//!   into the old slot. Borrowing iterators (`iter`/`iter_mut`) need no
//!   stamp: the borrow checker already pins the map while they live.
//!
//! Notes and non-goals
//! - Ordered iteration, open addressing, persistence, and thread safety
//!   are out of scope.
//! - Chain order is insertion order within a bucket and otherwise
//!   unspecified to callers; rebuilds may interleave chains.
//! - `Clone` deep-clones by re-inserting into a fresh map started at the
//!   policy minimum; Rust moves already provide the storage-transfer
//!   semantics a move constructor would.

mod bucket_array;
pub mod map;
mod map_proptest;
pub mod policy;

// Public surface
pub use map::{ChainMap, Cursor, CursorError, IntoIter, Iter, IterMut, KeyNotFound};
pub use map::{Keys, Values, ValuesMut};
pub use policy::RehashPolicy;
