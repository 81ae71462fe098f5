use super::complexity::{ClassificationResult, ComplexityScorer};
use crate::cache::{Fingerprint, RoutingCache};
use crate::config::{CacheConfig, ClassifierConfig};
use crate::error::{Result, RoutingError};
use std::sync::Arc;

/// Classifies requests, memoizing results in the routing cache.
///
/// The cache only saves work: a hit returns exactly what scoring would
/// produce, marked with `from_cache`.
pub struct Classifier {
    scorer: ComplexityScorer,
    cache: Arc<RoutingCache>,
}

impl Classifier {
    /// Creates a classifier sharing `cache`.
    pub fn new(config: ClassifierConfig, cache: Arc<RoutingCache>) -> Self {
        Self {
            scorer: ComplexityScorer::new(config),
            cache,
        }
    }

    /// Classifier with its own cache built from `cache_config`.
    pub fn with_cache_config(config: ClassifierConfig, cache_config: CacheConfig) -> Self {
        Self::new(config, Arc::new(RoutingCache::new(cache_config)))
    }

    /// Underlying scorer.
    pub const fn scorer(&self) -> &ComplexityScorer {
        &self.scorer
    }

    /// Routing cache consulted before scoring.
    pub fn cache(&self) -> &Arc<RoutingCache> {
        &self.cache
    }

    /// Classifies `text`.
    ///
    /// # Errors
    /// Returns [`RoutingError::InvalidInput`] for empty or whitespace-only text
    pub fn classify(&self, text: &str) -> Result<ClassificationResult> {
        if text.trim().is_empty() {
            return Err(RoutingError::InvalidInput(
                "request text must not be empty".to_owned(),
            ));
        }

        let fingerprint = Fingerprint::of(text);
        if let Some(mut cached) = self.cache.get(fingerprint) {
            tracing::debug!(%fingerprint, tier = %cached.tier, "routing cache hit");
            cached.from_cache = true;
            return Ok(cached);
        }

        let result = self.scorer.classify(text);
        tracing::debug!(
            %fingerprint,
            complexity = result.complexity,
            tier = %result.tier,
            "routing cache miss"
        );
        self.cache.insert(fingerprint, result.clone());
        Ok(result)
    }
}
