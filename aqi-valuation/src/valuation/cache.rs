//! Proposal cache.
//!
//! Bounded least-recently-used cache of valuation proposals keyed by company
//! code. Owned by a `ProposalBuilder` and dropped with it; there is no
//! process-wide instance.
//!
//! Concurrent builds of the same uncached code are not collapsed: each one
//! inserts, last writer wins. The values are identical for a fixed data
//! snapshot, so this only wastes lookups.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::types::{CompanyCode, ValuationProposal};

/// LRU cache of built proposals
pub struct ProposalCache {
    entries: Mutex<LruCache<CompanyCode, Arc<ValuationProposal>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProposalCache {
    /// Create a cache holding at most `capacity` proposals (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached proposal, marking it most recently used
    pub fn get(&self, code: &CompanyCode) -> Option<Arc<ValuationProposal>> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(code).cloned());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Cache a proposal, replacing any previous one for the same code.
    ///
    /// Returns the code evicted to make room, if any.
    pub fn insert(&self, proposal: Arc<ValuationProposal>) -> Option<CompanyCode> {
        let mut cache = self.entries.lock().ok()?;
        let code = proposal.code.clone();
        match cache.push(code.clone(), proposal) {
            Some((evicted, _)) if evicted != code => Some(evicted),
            _ => None,
        }
    }

    /// Drop the cached proposal of one company
    pub fn invalidate(&self, code: &CompanyCode) -> bool {
        self.entries
            .lock()
            .map(|mut cache| cache.pop(code).is_some())
            .unwrap_or(false)
    }

    /// Drop every cached proposal
    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.clear();
        }
    }

    /// Whether a proposal is cached, without touching recency
    pub fn contains(&self, code: &CompanyCode) -> bool {
        self.entries
            .lock()
            .map(|cache| cache.contains(code))
            .unwrap_or(false)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = self
            .entries
            .lock()
            .map(|cache| (cache.len(), cache.cap().get()))
            .unwrap_or((0, 0));

        CacheStats {
            entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_proposal(code: &str) -> Arc<ValuationProposal> {
        Arc::new(ValuationProposal {
            code: code.parse().unwrap(),
            bps_base: 8.12,
            eps_base: 1.0,
            industry_roe: 0.12,
            eps_forecast: [1.1, 1.3, 1.4],
        })
    }

    fn code(s: &str) -> CompanyCode {
        s.parse().unwrap()
    }

    #[test]
    fn test_cache_set_get() {
        let cache = ProposalCache::new(4);
        cache.insert(make_proposal("000625"));

        let cached = cache.get(&code("000625"));
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().bps_base, 8.12);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ProposalCache::new(4);
        assert!(cache.get(&code("000625")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = ProposalCache::new(4);
        cache.insert(make_proposal("000625"));

        assert!(cache.invalidate(&code("000625")));
        assert!(!cache.invalidate(&code("000625")));
        assert!(cache.get(&code("000625")).is_none());
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = ProposalCache::new(2);
        cache.insert(make_proposal("000625"));
        cache.insert(make_proposal("600519"));

        // Touch 000625 so 600519 becomes the eviction candidate
        assert!(cache.get(&code("000625")).is_some());

        let evicted = cache.insert(make_proposal("300072"));
        assert_eq!(evicted, Some(code("600519")));
        assert!(cache.contains(&code("000625")));
        assert!(!cache.contains(&code("600519")));
    }

    #[test]
    fn test_replacing_same_code_is_not_an_eviction() {
        let cache = ProposalCache::new(1);
        cache.insert(make_proposal("000625"));
        assert_eq!(cache.insert(make_proposal("000625")), None);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = ProposalCache::new(0);
        assert_eq!(cache.stats().capacity, 1);
    }

    #[test]
    fn test_cache_stats() {
        let cache = ProposalCache::new(8);
        cache.insert(make_proposal("000625"));
        cache.insert(make_proposal("600519"));
        cache.get(&code("000625"));
        cache.get(&code("688981"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
