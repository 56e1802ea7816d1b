//! Rebuild policy: decides when the bucket array must be reallocated and
//! how large the replacement should be.

/// Capacity policy for [`ChainMap`](crate::ChainMap).
///
/// After every mutating call the map asks the policy whether the current
/// bucket count still fits the entry count. A rebuild is ordered whenever
/// the table is full (`capacity <= len`) or sparse
/// (`capacity >= len * scale`); otherwise the capacity is left alone. This
/// keeps the load factor inside `(1/scale, 1)` once the entry count is
/// large enough that `min_capacity` stops dominating the target size.
///
/// The same policy governs both growth and shrink: the rebuild target is
/// `max(min_capacity, growth_factor * len)` in either direction, so a map
/// drained of its entries returns to `min_capacity` buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RehashPolicy {
    min_capacity: usize,
    scale: usize,
    growth_factor: usize,
}

impl RehashPolicy {
    /// Builds a policy from raw parameters.
    ///
    /// `min_capacity` and `growth_factor` must be at least 1 and `scale`
    /// at least 2; anything smaller degenerates the stable zone to the
    /// empty set and would force a rebuild on every mutation.
    pub fn new(min_capacity: usize, scale: usize, growth_factor: usize) -> Self {
        debug_assert!(min_capacity >= 1, "min_capacity must be at least 1");
        debug_assert!(scale >= 2, "scale must be at least 2");
        debug_assert!(growth_factor >= 1, "growth_factor must be at least 1");
        Self {
            min_capacity,
            scale,
            growth_factor,
        }
    }

    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    pub fn scale(&self) -> usize {
        self.scale
    }

    pub fn growth_factor(&self) -> usize {
        self.growth_factor
    }

    /// True when a bucket array of `capacity` chains must be rebuilt for a
    /// map holding `len` entries.
    ///
    /// The skip zone is `len < capacity < len * scale`, exclusive on both
    /// ends: a table at exactly `capacity == len` is full, one at exactly
    /// `capacity == len * scale` is sparse, and both rebuild.
    pub fn needs_rebuild(&self, len: usize, capacity: usize) -> bool {
        capacity <= len || capacity >= len.saturating_mul(self.scale)
    }

    /// Bucket count a rebuild should allocate for `len` entries.
    pub fn target_capacity(&self, len: usize) -> usize {
        self.min_capacity.max(self.growth_factor.saturating_mul(len))
    }
}

impl Default for RehashPolicy {
    /// Policy used by [`ChainMap::new`](crate::ChainMap::new): at least 10
    /// buckets, rebuild outside load factor `(1/4, 1)`, double on rebuild.
    fn default() -> Self {
        Self::new(10, 4, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::RehashPolicy;

    /// Invariant: the trigger is exclusive on both ends of the stable zone;
    /// `capacity == len` and `capacity == len * scale` both rebuild.
    #[test]
    fn trigger_boundaries() {
        let p = RehashPolicy::default();
        // Full table: capacity <= len.
        assert!(p.needs_rebuild(10, 10));
        assert!(p.needs_rebuild(11, 10));
        // Sparse table: capacity >= len * scale.
        assert!(p.needs_rebuild(5, 20));
        assert!(p.needs_rebuild(5, 21));
        // Strictly inside (len, len * scale): stable.
        assert!(!p.needs_rebuild(10, 11));
        assert!(!p.needs_rebuild(10, 39));
        assert!(!p.needs_rebuild(5, 19));
    }

    /// Invariant: an empty map is always rebuild-eligible (capacity is
    /// trivially `>= 0 * scale`), which is what shrinks a cleared map back
    /// to its minimum capacity.
    #[test]
    fn empty_map_always_rebuilds() {
        let p = RehashPolicy::default();
        assert!(p.needs_rebuild(0, 10));
        assert!(p.needs_rebuild(0, 1000));
        assert_eq!(p.target_capacity(0), 10);
    }

    /// Invariant: the rebuild target doubles the entry count but never
    /// drops below the minimum capacity.
    #[test]
    fn target_capacity_floors_at_minimum() {
        let p = RehashPolicy::default();
        assert_eq!(p.target_capacity(0), 10);
        assert_eq!(p.target_capacity(4), 10);
        assert_eq!(p.target_capacity(5), 10);
        assert_eq!(p.target_capacity(6), 12);
        assert_eq!(p.target_capacity(100), 200);
    }

    /// Invariant: once `len >= 3` under the default parameters, rebuilding
    /// lands the capacity inside the stable zone, so a second consecutive
    /// rebuild is never ordered.
    #[test]
    fn rebuild_reaches_stable_zone() {
        let p = RehashPolicy::default();
        for len in 3..2000 {
            let cap = p.target_capacity(len);
            assert!(
                !p.needs_rebuild(len, cap),
                "len={len} cap={cap} still rebuild-eligible"
            );
        }
    }

    /// Invariant: custom parameters feed through to both the trigger and
    /// the target.
    #[test]
    fn custom_parameters() {
        let p = RehashPolicy::new(4, 2, 3);
        assert_eq!(p.min_capacity(), 4);
        assert_eq!(p.scale(), 2);
        assert_eq!(p.growth_factor(), 3);
        assert_eq!(p.target_capacity(10), 30);
        assert!(p.needs_rebuild(10, 20)); // 20 >= 10 * 2
        assert!(!p.needs_rebuild(10, 19));
    }

    /// Invariant: the trigger does not overflow for huge entry counts;
    /// `len * scale` saturates instead of wrapping.
    #[test]
    fn trigger_saturates_on_overflow() {
        let p = RehashPolicy::default();
        assert!(!p.needs_rebuild(usize::MAX / 2, usize::MAX / 2 + 1));
    }
}
