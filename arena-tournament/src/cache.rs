//! Worker-side genome cache
//!
//! Hydrating a genome into an executor is the expensive part of a match, so
//! each worker keeps the most recently used ones. The cache is owned by a
//! single worker thread and is reset explicitly before each generation.

use arena_core::{Executor, GenomeId};
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A genome hydrated all the way to an executor
pub struct CachedGenome {
    pub genome: Value,
    pub phenotype: Value,
    pub executor: Box<dyn Executor>,
}

/// Least-recently-used map from genome id to hydrated genome
pub struct GenomeCache {
    capacity: usize,
    entries: FxHashMap<GenomeId, (u64, CachedGenome)>,
    clock: u64,
}

impl GenomeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: FxHashMap::default(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove an entry so its executor can be borrowed mutably for a match
    ///
    /// Callers hand it back with [`GenomeCache::insert`] afterwards, which
    /// also marks it as most recently used.
    pub fn take(&mut self, id: GenomeId) -> Option<CachedGenome> {
        self.entries.remove(&id).map(|(_, cached)| cached)
    }

    pub fn insert(&mut self, id: GenomeId, cached: CachedGenome) {
        self.clock += 1;
        self.entries.insert(id, (self.clock, cached));
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Drop everything; invoked once per generation
    pub fn reset(&mut self) {
        self.entries.clear();
        self.clock = 0;
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (stamp, _))| *stamp)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::Result;
    use serde_json::json;

    struct Constant(f64);

    impl Executor for Constant {
        fn execute(&mut self, _input: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![self.0])
        }
    }

    fn cached(value: f64) -> CachedGenome {
        CachedGenome {
            genome: json!(value),
            phenotype: json!(value),
            executor: Box::new(Constant(value)),
        }
    }

    fn id(organism: u32) -> GenomeId {
        GenomeId::pack(0, organism).unwrap()
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = GenomeCache::new(2);
        cache.insert(id(1), cached(1.0));
        cache.insert(id(2), cached(2.0));

        // Touch 1 so 2 becomes the oldest
        let one = cache.take(id(1)).unwrap();
        cache.insert(id(1), one);
        cache.insert(id(3), cached(3.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.take(id(2)).is_none());
        assert!(cache.take(id(1)).is_some());
        assert!(cache.take(id(3)).is_some());
    }

    #[test]
    fn test_take_returns_executor() {
        let mut cache = GenomeCache::new(4);
        cache.insert(id(9), cached(0.75));

        let mut entry = cache.take(id(9)).unwrap();
        assert_eq!(entry.executor.execute(&[]).unwrap(), vec![0.75]);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_reset_clears() {
        let mut cache = GenomeCache::new(4);
        cache.insert(id(1), cached(1.0));
        cache.insert(id(2), cached(2.0));
        cache.reset();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = GenomeCache::new(0);
        cache.insert(id(1), cached(1.0));
        cache.insert(id(2), cached(2.0));
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.take(id(2)).is_some());
    }
}
