//! Routing cache storage on a concurrent map.
//!
//! Entries expire after a fixed TTL. Expired entries are dropped lazily on
//! lookup or in bulk by [`RoutingCache::sweep`]; an expired entry is never
//! returned.

use crate::analyzer::{ClassificationResult, canonical_text};
use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash as _, Hasher as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Share of `max_entries` evicted at once when the cache is full.
const EVICTION_BATCH_DIVISOR: usize = 16;

/// Normalized hash of a request text.
///
/// Hashes [`canonical_text`], the same form the scorer reads, so texts
/// differing only in case, spacing or blank lines share a fingerprint while
/// texts with different line structure do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint of `text` after normalization.
    pub fn of(text: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        Self::normalize(text).hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Text as it is hashed.
    pub fn normalize(text: &str) -> String {
        canonical_text(text)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:016x}", self.0)
    }
}

/// A cached classification with its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached classification
    pub result: ClassificationResult,
    /// When the entry was stored
    pub inserted_at: Instant,
    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Entry living for `ttl` from now.
    pub fn new(result: ClassificationResult, ttl: Duration) -> Self {
        let inserted_at = Instant::now();
        Self {
            result,
            inserted_at,
            expires_at: inserted_at + ttl,
        }
    }

    /// Checks if this cache entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Best-effort classification cache shared by concurrent dispatches.
pub struct RoutingCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl RoutingCache {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Whether lookups and inserts are active.
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Gets a cached result if it exists and hasn't expired
    pub fn get(&self, fingerprint: Fingerprint) -> Option<ClassificationResult> {
        if !self.config.enabled {
            return None;
        }

        let found = self.entries.get(&fingerprint).map(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.result.clone())
            }
        });

        match found {
            Some(Some(result)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Some(None) => {
                if self
                    .entries
                    .remove_if(&fingerprint, |_, entry| entry.is_expired())
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a result, evicting the oldest entries when full
    pub fn insert(&self, fingerprint: Fingerprint, result: ClassificationResult) {
        if !self.config.enabled {
            return;
        }

        if !self.entries.contains_key(&fingerprint) && self.entries.len() >= self.config.max_entries {
            self.sweep();
            while self.entries.len() >= self.config.max_entries && self.evict_oldest() {}
        }

        self.entries
            .insert(fingerprint, CacheEntry::new(result, self.config.ttl()));
    }

    /// Evicts the oldest batch of entries, a fixed share of the bound, so a
    /// full cache is scanned once per batch rather than on every insert.
    /// Returns `false` when the cache is empty.
    fn evict_oldest(&self) -> bool {
        let mut ages: Vec<(Instant, Fingerprint)> = self
            .entries
            .iter()
            .map(|entry| (entry.inserted_at, *entry.key()))
            .collect();
        if ages.is_empty() {
            return false;
        }

        let batch = (self.config.max_entries / EVICTION_BATCH_DIVISOR).clamp(1, ages.len());
        if batch < ages.len() {
            ages.select_nth_unstable_by_key(batch - 1, |(inserted_at, _)| *inserted_at);
        }
        for (_, key) in ages.into_iter().take(batch) {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        self.expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Clears all entries from the cache
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl Default for RoutingCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub entries: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through to scoring
    pub misses: u64,
    /// Entries removed to stay under the size bound
    pub evictions: u64,
    /// Entries removed after their TTL
    pub expirations: u64,
}

impl CacheStats {
    /// Share of lookups served from the cache, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}
