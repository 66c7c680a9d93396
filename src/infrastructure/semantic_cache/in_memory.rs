//! In-memory semantic response cache

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::store::EntryStore;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::semantic_cache::{
    CacheEntry, CacheHit, CacheStats, CachedResponse, EntryId, EvictionPolicy, MatchType,
    PopularQuery, QueryDigest, Rejection, ResponseCache, ResponseValidator, SemanticCacheConfig,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::metrics;

/// Pairs embedded concurrently while warming
const WARM_CONCURRENCY: usize = 8;

/// Why a stored entry can no longer be served
#[derive(Debug)]
enum Staleness {
    Expired,
    Invalid(Rejection),
}

/// Entries and statistics, guarded together
#[derive(Debug, Default)]
struct CacheState {
    store: EntryStore,
    stats: CacheStats,
}

/// Two-tier response cache: exact digest match first, then embedding similarity
///
/// All state sits behind one `RwLock`. The O(n) similarity scan runs under
/// the read lock; removals, bookkeeping and statistics are applied afterwards
/// under the write lock, re-checking whatever the scan decided.
#[derive(Debug)]
pub struct SemanticCache {
    state: RwLock<CacheState>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    validator: ResponseValidator,
    eviction: EvictionPolicy,
    config: SemanticCacheConfig,
}

impl SemanticCache {
    /// Create a cache, refusing configurations with undefined behavior
    pub fn new(
        config: SemanticCacheConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        let validator =
            ResponseValidator::new(&config.error_phrase_denylist, config.min_confidence)?;

        info!(
            max_size = config.max_size,
            threshold_high = config.similarity_threshold_high,
            threshold_medium = config.similarity_threshold_medium,
            semantic = config.enable_semantic_search,
            provider = embedding_provider.provider_name(),
            "Semantic cache initialized"
        );

        Ok(Self {
            state: RwLock::new(CacheState::default()),
            embedding_provider,
            validator,
            eviction: EvictionPolicy::new(),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState>, DomainError> {
        self.state
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>, DomainError> {
        self.state
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Embed `text`, absorbing provider failures
    ///
    /// Vectors that are empty or disagree with the provider's advertised
    /// dimensions count as failures, so every stored embedding has one length.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.embedding_provider.embed(text).await.and_then(|embedding| {
            let expected = self.embedding_provider.dimensions();

            if embedding.is_empty() || expected.is_some_and(|dims| dims != embedding.len()) {
                return Err(DomainError::provider(
                    self.embedding_provider.provider_name(),
                    format!(
                        "embedding has {} dimensions, expected {:?}",
                        embedding.len(),
                        expected
                    ),
                ));
            }

            Ok(embedding)
        });

        match result {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Failed to generate embedding, falling back to exact match: {}", e);
                metrics::record_embedding_failure(self.embedding_provider.provider_name());
                None
            }
        }
    }

    fn staleness(&self, entry: &CacheEntry, now: DateTime<Utc>) -> Option<Staleness> {
        if entry.is_expired_at(now) {
            return Some(Staleness::Expired);
        }

        self.validator.check(entry.response()).err().map(Staleness::Invalid)
    }

    fn drop_stale(store: &mut EntryStore, id: EntryId, reason: Staleness) {
        let Some(entry) = store.remove(id) else {
            return;
        };

        match reason {
            Staleness::Expired => {
                debug!(query = entry.query(), "Dropped expired cache entry");
                metrics::record_expired(1);
            }
            Staleness::Invalid(rejection) => {
                debug!(query = entry.query(), %rejection, "Dropped invalid cache entry");
                metrics::record_rejection("read", &rejection);
            }
        }
    }

    /// Exact-match tier; stale entries found here are removed
    fn lookup_exact(&self, key: &QueryDigest) -> Result<Option<CacheHit>, DomainError> {
        let mut guard = self.write_state()?;
        let state = &mut *guard;
        let now = Utc::now();

        let (id, stale) = match state.store.lookup_exact(key) {
            Some(entry) => (entry.id(), self.staleness(entry, now)),
            None => return Ok(None),
        };

        if let Some(reason) = stale {
            Self::drop_stale(&mut state.store, id, reason);
            return Ok(None);
        }

        let Some(entry) = state.store.get_mut(id) else {
            return Ok(None);
        };

        entry.record_access(now);
        let hit = CacheHit::new(entry.response().clone(), 1.0, MatchType::Exact);
        state.stats.record_lookup(Some(MatchType::Exact));

        debug!(query = entry.query(), "Exact cache hit");

        Ok(Some(hit))
    }

    /// Similarity tier; records the lookup outcome itself
    async fn lookup_semantic(&self, query: &str) -> Result<Option<CacheHit>, DomainError> {
        let Some(embedding) = self.embed(query).await else {
            let mut state = self.write_state()?;
            state.stats.embedding_failures += 1;
            state.stats.record_lookup(None);
            return Ok(None);
        };

        let outcome = self
            .read_state()?
            .store
            .scan(&embedding, Utc::now(), &self.validator);

        let mut guard = self.write_state()?;
        let state = &mut *guard;
        let now = Utc::now();

        for &id in &outcome.stale {
            if let Some(reason) = state.store.get(id).and_then(|e| self.staleness(e, now)) {
                Self::drop_stale(&mut state.store, id, reason);
            }
        }

        state.stats.record_similarity_scan(outcome.mean_similarity());

        let matched = outcome.best.and_then(|(id, similarity)| {
            MatchType::classify(
                similarity,
                self.config.similarity_threshold_high,
                self.config.similarity_threshold_medium,
            )
            .map(|match_type| (id, similarity, match_type))
        });

        let Some((id, similarity, match_type)) = matched else {
            debug!(
                best = ?outcome.best.map(|(_, s)| s),
                compared = outcome.compared,
                "Semantic cache miss"
            );
            state.stats.record_lookup(None);
            return Ok(None);
        };

        // the winner may have expired or been removed since the scan
        let stale = match state.store.get(id) {
            Some(entry) => self.staleness(entry, now),
            None => {
                state.stats.record_lookup(None);
                return Ok(None);
            }
        };

        if let Some(reason) = stale {
            Self::drop_stale(&mut state.store, id, reason);
            state.stats.record_lookup(None);
            return Ok(None);
        }

        let Some(entry) = state.store.get_mut(id) else {
            state.stats.record_lookup(None);
            return Ok(None);
        };

        entry.record_access(now);
        let hit = CacheHit::new(entry.response().clone(), similarity, match_type);
        state.stats.record_lookup(Some(match_type));

        debug!(
            query = entry.query(),
            similarity,
            match_type = %match_type,
            "Semantic cache hit"
        );

        Ok(Some(hit))
    }

    fn evict_one(&self, state: &mut CacheState, now: DateTime<Utc>) {
        let Some(victim) = self.eviction.select_victim(state.store.entries(), now) else {
            return;
        };

        if let Some(entry) = state.store.remove(victim) {
            state.stats.evictions += 1;
            metrics::record_eviction();
            debug!(
                query = entry.query(),
                access_count = entry.access_count(),
                "Evicted cache entry"
            );
        }
    }

    /// Validate and embed a response ahead of insertion
    ///
    /// `None` means the response must not be cached.
    async fn prepare_entry(
        &self,
        query: &str,
        response: &CachedResponse,
    ) -> Result<Option<Vec<f32>>, DomainError> {
        if let Err(rejection) = self.validator.check(response) {
            debug!(query, %rejection, "Response not cached");
            metrics::record_rejection("write", &rejection);
            return Ok(None);
        }

        // without semantic search the embedding would never be read
        if !self.config.enable_semantic_search {
            return Ok(Some(Vec::new()));
        }

        match self.embed(query).await {
            Some(embedding) => Ok(Some(embedding)),
            None => {
                self.write_state()?.stats.embedding_failures += 1;
                Ok(None)
            }
        }
    }

    fn insert_entry(
        &self,
        query: &str,
        embedding: Vec<f32>,
        response: CachedResponse,
        confidence: f32,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let mut guard = self.write_state()?;
        let state = &mut *guard;
        let now = Utc::now();
        let key = QueryDigest::from_query(query);

        let previous_hits = state.store.lookup_exact(&key).map(|e| e.access_count());

        if previous_hits.is_none() && state.store.len() >= self.config.max_size {
            self.evict_one(state, now);
        }

        let id = state.store.allocate_id();
        let entry = CacheEntry::new(id, query, embedding, response, confidence, ttl, now)
            .with_access_count(previous_hits.unwrap_or(0));

        state.store.insert(entry);
        metrics::record_size(state.store.len());

        debug!(query, replaced = previous_hits.is_some(), "Cached response");

        Ok(())
    }

    /// Validate, embed and insert; returns whether the response was cached
    async fn store_response(
        &self,
        query: &str,
        response: CachedResponse,
        confidence: f32,
        ttl: Duration,
    ) -> Result<bool, DomainError> {
        let Some(embedding) = self.prepare_entry(query, &response).await? else {
            return Ok(false);
        };

        self.insert_entry(query, embedding, response, confidence, ttl)?;

        Ok(true)
    }
}

#[async_trait]
impl ResponseCache for SemanticCache {
    async fn get(&self, query: &str) -> Result<Option<CacheHit>, DomainError> {
        let key = QueryDigest::from_query(query);

        if let Some(hit) = self.lookup_exact(&key)? {
            metrics::record_lookup(Some(hit.match_type));
            return Ok(Some(hit));
        }

        let hit = if self.config.enable_semantic_search {
            self.lookup_semantic(query).await?
        } else {
            self.write_state()?.stats.record_lookup(None);
            None
        };

        metrics::record_lookup(hit.as_ref().map(|h| h.match_type));

        Ok(hit)
    }

    async fn set(
        &self,
        query: &str,
        response: CachedResponse,
        confidence: f32,
    ) -> Result<(), DomainError> {
        self.store_response(query, response, confidence, self.config.default_ttl())
            .await
            .map(|_| ())
    }

    async fn set_with_ttl(
        &self,
        query: &str,
        response: CachedResponse,
        confidence: f32,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        self.store_response(query, response, confidence, ttl)
            .await
            .map(|_| ())
    }

    async fn invalidate(&self, query: &str) -> Result<bool, DomainError> {
        let mut state = self.write_state()?;
        let removed = state.store.remove_by_key(&QueryDigest::from_query(query));

        if removed.is_some() {
            metrics::record_size(state.store.len());
            debug!(query, "Invalidated cache entry");
        }

        Ok(removed.is_some())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let mut state = self.write_state()?;
        let dropped = state.store.len();

        state.store.clear();
        metrics::record_size(0);

        info!(dropped, "Semantic cache cleared");

        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, DomainError> {
        let mut state = self.write_state()?;
        let expired = state.store.expired_ids(Utc::now());
        let count = expired.len();

        for id in expired {
            state.store.remove(id);
        }

        metrics::record_expired(count);
        metrics::record_size(state.store.len());

        if count > 0 {
            info!(removed = count, remaining = state.store.len(), "Expired cache entries removed");
        }

        Ok(count)
    }

    async fn warm_cache(
        &self,
        pairs: Vec<(String, CachedResponse)>,
    ) -> Result<usize, DomainError> {
        let total = pairs.len();
        let ttl = self.config.default_ttl();

        // embeddings run concurrently but come back in input order, so
        // inserts happen exactly as a sequence of `set` calls would
        let mut prepared = stream::iter(pairs)
            .map(|(query, response)| async move {
                let embedding = self.prepare_entry(&query, &response).await?;
                Ok::<_, DomainError>((query, response, embedding))
            })
            .buffered(WARM_CONCURRENCY);

        let mut accepted = 0;

        while let Some(result) = prepared.next().await {
            let (query, response, embedding) = result?;

            if let Some(embedding) = embedding {
                let confidence = response.confidence_score;
                self.insert_entry(&query, embedding, response, confidence, ttl)?;
                accepted += 1;
            }
        }

        info!(accepted, total, "Cache warmed");

        Ok(accepted)
    }

    async fn stats(&self) -> Result<CacheStats, DomainError> {
        let state = self.read_state()?;

        Ok(CacheStats {
            total_entries: state.store.len(),
            ..state.stats.clone()
        })
    }

    async fn popular_queries(&self, top_n: usize) -> Result<Vec<PopularQuery>, DomainError> {
        let state = self.read_state()?;
        let now = Utc::now();

        let mut popular: Vec<PopularQuery> = state
            .store
            .entries()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| PopularQuery {
                query: entry.query().to_string(),
                access_count: entry.access_count(),
                popularity_score: entry.popularity_score(),
            })
            .collect();

        popular.sort_by(|a, b| {
            b.popularity_score
                .partial_cmp(&a.popularity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.access_count.cmp(&a.access_count))
        });
        popular.truncate(top_n);

        Ok(popular)
    }

    async fn size(&self) -> Result<usize, DomainError> {
        Ok(self.read_state()?.store.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::{cosine_similarity, FixedEmbeddingProvider, MockEmbeddingProvider};
    use futures::future::join_all;
    use serde_json::json;

    const ML_QUERY: &str = "What is machine learning?";
    const ML_PARAPHRASE: &str = "What is Machine Learning";
    const PASTA_QUERY: &str = "How to cook pasta?";

    fn valid(text: &str) -> CachedResponse {
        CachedResponse::new(text)
            .with_confidence(0.9)
            .with_source(json!({"id": "d1"}))
    }

    fn scenario_provider() -> FixedEmbeddingProvider {
        FixedEmbeddingProvider::new(64)
            .with_vector(ML_QUERY, vec![1.0, 0.0])
            .with_vector(ML_PARAPHRASE, vec![0.97, (1.0f32 - 0.97 * 0.97).sqrt()])
            .with_vector(PASTA_QUERY, vec![0.1, (1.0f32 - 0.01).sqrt()])
    }

    fn create_cache(config: SemanticCacheConfig, provider: FixedEmbeddingProvider) -> SemanticCache {
        SemanticCache::new(config, Arc::new(provider)).unwrap()
    }

    fn default_cache() -> SemanticCache {
        create_cache(SemanticCacheConfig::default(), scenario_provider())
    }

    fn assert_consistent(cache: &SemanticCache) {
        assert!(cache.state.read().unwrap().store.is_consistent());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FixedEmbeddingProvider::new(4));

        let result = SemanticCache::new(SemanticCacheConfig::new().with_max_size(0), provider);

        assert!(result.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_exact_hit_after_set() {
        let cache = default_cache();
        let response = valid("ML is...");

        cache.set(ML_QUERY, response.clone(), 0.9).await.unwrap();
        let hit = cache.get(ML_QUERY).await.unwrap().unwrap();

        assert_eq!(hit, CacheHit::new(response, 1.0, MatchType::Exact));
    }

    #[tokio::test]
    async fn test_exact_hit_ignores_case_and_whitespace() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        let hit = cache.get("  what is MACHINE learning?  ").await.unwrap().unwrap();

        assert_eq!(hit.match_type, MatchType::Exact);
        assert_eq!(hit.similarity, 1.0);
    }

    #[tokio::test]
    async fn test_machine_learning_scenario() {
        let config = SemanticCacheConfig::new()
            .with_max_size(1000)
            .with_thresholds(0.95, 0.85);
        let cache = create_cache(config, scenario_provider());

        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        let exact = cache.get(ML_QUERY).await.unwrap().unwrap();
        assert_eq!(exact.response.text, "ML is...");
        assert_eq!(exact.similarity, 1.0);
        assert_eq!(exact.match_type, MatchType::Exact);

        let semantic = cache.get(ML_PARAPHRASE).await.unwrap().unwrap();
        assert_eq!(semantic.response.text, "ML is...");
        assert!((semantic.similarity - 0.97).abs() < 1e-5);
        assert_eq!(semantic.match_type, MatchType::SemanticHigh);

        assert!(cache.get(PASTA_QUERY).await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.semantic_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_threshold_boundaries() {
        let stored = vec![1.0, 0.0];
        let incoming = vec![0.6, 0.8];
        let similarity = cosine_similarity(&incoming, &stored);
        let one_ulp_up = f32::from_bits(similarity.to_bits() + 1);

        let cases = [
            ((similarity, 0.5), Some(MatchType::SemanticHigh)),
            ((one_ulp_up, 0.5), Some(MatchType::SemanticMedium)),
            ((0.9, similarity), Some(MatchType::SemanticMedium)),
            ((0.9, one_ulp_up), None),
        ];

        for ((high, medium), expected) in cases {
            let provider = FixedEmbeddingProvider::new(8)
                .with_vector("stored", stored.clone())
                .with_vector("incoming", incoming.clone());
            let config = SemanticCacheConfig::new().with_thresholds(high, medium);
            let cache = create_cache(config, provider);

            cache.set("stored", valid("answer"), 0.9).await.unwrap();
            let result = cache.get("incoming").await.unwrap().map(|hit| hit.match_type);

            assert_eq!(result, expected, "thresholds ({}, {})", high, medium);
        }
    }

    #[tokio::test]
    async fn test_semantic_medium_match() {
        let provider = FixedEmbeddingProvider::new(8)
            .with_vector("stored", vec![1.0, 0.0])
            .with_vector("close", vec![0.9, (1.0f32 - 0.81).sqrt()]);
        let cache = create_cache(SemanticCacheConfig::default(), provider);

        cache.set("stored", valid("answer"), 0.9).await.unwrap();
        let hit = cache.get("close").await.unwrap().unwrap();

        assert_eq!(hit.match_type, MatchType::SemanticMedium);
        assert!((hit.similarity - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_capacity_invariant() {
        let config = SemanticCacheConfig::new().with_max_size(3);
        let cache = create_cache(config, FixedEmbeddingProvider::new(64));

        for i in 0..10 {
            cache
                .set(&format!("query {}", i), valid("answer"), 0.9)
                .await
                .unwrap();
            assert!(cache.size().await.unwrap() <= 3);
            assert_consistent(&cache);
        }

        assert_eq!(cache.stats().await.unwrap().evictions, 7);
    }

    #[tokio::test]
    async fn test_eviction_selects_least_popular() {
        let config = SemanticCacheConfig::new().with_max_size(2);
        let cache = create_cache(config, FixedEmbeddingProvider::new(64));

        cache.set("q1", valid("a1"), 0.9).await.unwrap();
        cache.set("q2", valid("a2"), 0.9).await.unwrap();
        for _ in 0..5 {
            assert!(cache.get("q2").await.unwrap().is_some());
        }

        cache.set("q3", valid("a3"), 0.9).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 2);
        assert!(cache.get("q1").await.unwrap().is_none());
        assert!(cache.get("q2").await.unwrap().is_some());
        assert!(cache.get("q3").await.unwrap().is_some());
        assert_eq!(cache.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_in_place() {
        let cache = default_cache();

        cache.set(ML_QUERY, valid("first"), 0.9).await.unwrap();
        cache.get(ML_QUERY).await.unwrap();
        cache.set(ML_QUERY, valid("second"), 0.9).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 1);
        assert_consistent(&cache);

        let hit = cache.get(ML_QUERY).await.unwrap().unwrap();
        assert_eq!(hit.response.text, "second");

        // semantic lookups can no longer reach the old payload either
        let semantic = cache.get(ML_PARAPHRASE).await.unwrap().unwrap();
        assert_eq!(semantic.response.text, "second");

        let popular = cache.popular_queries(1).await.unwrap();
        assert_eq!(popular[0].access_count, 3);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let config = SemanticCacheConfig::new().with_max_size(2);
        let cache = create_cache(config, FixedEmbeddingProvider::new(64));

        cache.set("q1", valid("a1"), 0.9).await.unwrap();
        cache.set("q2", valid("a2"), 0.9).await.unwrap();
        cache.set("q1", valid("a1 v2"), 0.9).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 2);
        assert_eq!(cache.stats().await.unwrap().evictions, 0);
    }

    #[tokio::test]
    async fn test_invalid_responses_are_not_cached() {
        let cache = default_cache();

        let rejected = [
            CachedResponse::new("").with_confidence(0.9).with_source(json!({"id": "d1"})),
            valid("Sorry, no relevant documents found."),
            valid("ML is...").with_confidence(0.1),
            CachedResponse::new("ML is...").with_confidence(0.9),
        ];

        for response in rejected {
            cache.set(ML_QUERY, response, 0.9).await.unwrap();
            assert_eq!(cache.size().await.unwrap(), 0);
        }

        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_invalidated_after_caching_is_dropped_on_exact_read() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        {
            let mut state = cache.state.write().unwrap();
            let id = state.store.entries().next().unwrap().id();
            state.store.get_mut(id).unwrap().response_mut().text = "an error occurred".into();
        }

        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
        assert_eq!(cache.size().await.unwrap(), 0);
        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
        assert_consistent(&cache);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.total_queries, 2);
    }

    #[tokio::test]
    async fn test_entry_invalidated_after_caching_is_skipped_by_scan() {
        let provider = scenario_provider().with_vector("ML overview", vec![0.985, -0.174]);
        let cache = create_cache(SemanticCacheConfig::default(), provider);

        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();
        cache.set("ML overview", valid("Overview"), 0.9).await.unwrap();

        {
            let mut state = cache.state.write().unwrap();
            let id = state.store.entries().next().unwrap().id();
            state.store.get_mut(id).unwrap().response_mut().sources.clear();
        }

        // the corrupted entry is the closer one; the scan continues past it
        let hit = cache.get(ML_PARAPHRASE).await.unwrap().unwrap();

        assert_eq!(hit.response.text, "Overview");
        assert_eq!(hit.match_type, MatchType::SemanticMedium);
        assert_eq!(cache.size().await.unwrap(), 1);
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = default_cache();

        cache
            .set_with_ttl(ML_QUERY, valid("ML is..."), 0.9, Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
        assert_eq!(cache.size().await.unwrap(), 0);
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_expired_entry_not_served_semantically() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        {
            let mut state = cache.state.write().unwrap();
            let id = state.store.entries().next().unwrap().id();
            state.store.get_mut(id).unwrap().backdate(chrono::Duration::hours(2));
        }

        assert!(cache.get(ML_PARAPHRASE).await.unwrap().is_none());
        assert_eq!(cache.size().await.unwrap(), 0);
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_stats_consistency() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        for query in [ML_QUERY, ML_PARAPHRASE, PASTA_QUERY, "unknown", ML_QUERY] {
            cache.get(query).await.unwrap();
        }

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_queries, 5);
        assert_eq!(stats.cache_hits + stats.cache_misses, stats.total_queries);
        assert_eq!(stats.exact_hits + stats.semantic_hits, stats.cache_hits);
        assert_eq!(stats.exact_hits, 2);
        assert_eq!(stats.semantic_hits, 1);
        assert_eq!(stats.total_similarity_searches, 3);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_similarity_average_tracks_every_scan() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        cache.get(PASTA_QUERY).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_similarity_searches, 1);
        assert!((stats.avg_similarity_score - 0.01).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embedding_failure_on_get_degrades_to_exact_match() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .withf(|text| text.starts_with("cached"))
            .returning(|_| Ok(vec![1.0, 0.0]));
        provider
            .expect_embed()
            .withf(|text| text.starts_with("other"))
            .returning(|_| Err(DomainError::provider("mock", "timeout")));
        provider.expect_provider_name().return_const("mock");
        provider.expect_dimensions().return_const(None);

        let cache = SemanticCache::new(SemanticCacheConfig::default(), Arc::new(provider)).unwrap();

        cache.set("cached query", valid("answer"), 0.9).await.unwrap();

        assert!(cache.get("cached query").await.unwrap().is_some());
        assert!(cache.get("other query").await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.embedding_failures, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.total_similarity_searches, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_on_set_skips_caching() {
        let provider = FixedEmbeddingProvider::new(8).with_error("connection reset");
        let cache = create_cache(SemanticCacheConfig::default(), provider);

        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().embedding_failures, 1);
    }

    #[tokio::test]
    async fn test_embedding_with_wrong_dimensions_is_rejected() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .returning(|_| Ok(vec![1.0, 0.0]));
        provider.expect_provider_name().return_const("mock");
        provider.expect_dimensions().return_const(Some(3));

        let cache = SemanticCache::new(SemanticCacheConfig::default(), Arc::new(provider)).unwrap();

        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().embedding_failures, 1);
    }

    #[tokio::test]
    async fn test_semantic_search_disabled_never_embeds() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().never();
        provider.expect_provider_name().return_const("mock");

        let config = SemanticCacheConfig::new().with_semantic_search(false);
        let cache = SemanticCache::new(config, Arc::new(provider)).unwrap();

        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        assert!(cache.get(ML_QUERY).await.unwrap().is_some());
        assert!(cache.get(ML_PARAPHRASE).await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_similarity_searches, 0);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();

        assert!(cache.invalidate("what is machine learning?").await.unwrap());
        assert!(!cache.invalidate(ML_QUERY).await.unwrap());
        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
        assert!(cache.is_empty().await.unwrap());
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_clear_keeps_lifetime_counters() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();
        cache.get(ML_QUERY).await.unwrap();

        cache.clear().await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.cache_hits, 1);
        assert!(cache.get(ML_QUERY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = default_cache();
        cache.set(ML_QUERY, valid("ML is..."), 0.9).await.unwrap();
        cache
            .set_with_ttl(PASTA_QUERY, valid("Boil water."), 0.9, Duration::from_secs(0))
            .await
            .unwrap();

        assert_eq!(cache.cleanup_expired().await.unwrap(), 1);
        assert_eq!(cache.size().await.unwrap(), 1);
        assert_eq!(cache.cleanup_expired().await.unwrap(), 0);
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_warm_cache_validates_every_pair() {
        let cache = create_cache(SemanticCacheConfig::default(), FixedEmbeddingProvider::new(64));

        let pairs = vec![
            ("q1".to_string(), valid("a1")),
            ("q2".to_string(), valid("a2")),
            ("q3".to_string(), valid("please contact support")),
            ("q4".to_string(), valid("a4").with_confidence(0.0)),
        ];

        assert_eq!(cache.warm_cache(pairs).await.unwrap(), 2);
        assert_eq!(cache.size().await.unwrap(), 2);
        assert!(cache.get("q2").await.unwrap().is_some());
    }

    /// Delays texts tagged `#slow` so later pairs finish embedding first
    #[derive(Debug)]
    struct UnevenLatencyProvider {
        inner: FixedEmbeddingProvider,
    }

    #[async_trait]
    impl EmbeddingProvider for UnevenLatencyProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
            if text.trim_end().ends_with("#slow") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.embed(text).await
        }

        fn provider_name(&self) -> &'static str {
            "uneven"
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }
    }

    fn uneven_cache(config: SemanticCacheConfig) -> SemanticCache {
        let provider = UnevenLatencyProvider {
            inner: FixedEmbeddingProvider::new(64),
        };
        SemanticCache::new(config, Arc::new(provider)).unwrap()
    }

    #[tokio::test]
    async fn test_warm_cache_later_duplicate_wins() {
        let cache = uneven_cache(SemanticCacheConfig::default());

        let pairs = vec![
            ("faq #slow".to_string(), valid("old answer")),
            ("FAQ #slow ".to_string(), valid("new answer")),
        ];

        assert_eq!(cache.warm_cache(pairs).await.unwrap(), 2);
        assert_eq!(cache.size().await.unwrap(), 1);

        let hit = cache.get("faq #slow").await.unwrap().unwrap();
        assert_eq!(hit.response.text, "new answer");
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_warm_cache_evicts_in_input_order() {
        let cache = uneven_cache(SemanticCacheConfig::new().with_max_size(1));

        let pairs = vec![
            ("first #slow".to_string(), valid("a1")),
            ("second".to_string(), valid("a2")),
        ];

        assert_eq!(cache.warm_cache(pairs).await.unwrap(), 2);

        let remaining = cache.popular_queries(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].query, "second");
        assert_eq!(cache.stats().await.unwrap().evictions, 1);
        assert_consistent(&cache);
    }

    #[tokio::test]
    async fn test_popular_queries_ordering() {
        let cache = create_cache(SemanticCacheConfig::default(), FixedEmbeddingProvider::new(64));

        for query in ["rare", "common", "medium"] {
            cache.set(query, valid("answer"), 0.9).await.unwrap();
        }
        for _ in 0..3 {
            cache.get("common").await.unwrap();
        }
        cache.get("medium").await.unwrap();

        let popular = cache.popular_queries(2).await.unwrap();

        assert_eq!(popular.len(), 2);
        assert_eq!(popular[0].query, "common");
        assert_eq!(popular[0].access_count, 3);
        assert_eq!(popular[1].query, "medium");
        assert!(popular[0].popularity_score > popular[1].popularity_score);
    }

    #[tokio::test]
    async fn test_popular_queries_skips_expired_entries() {
        let cache = create_cache(SemanticCacheConfig::default(), FixedEmbeddingProvider::new(64));

        cache.set("fresh", valid("answer"), 0.9).await.unwrap();
        cache
            .set_with_ttl("stale", valid("answer"), 0.9, Duration::from_secs(0))
            .await
            .unwrap();

        let popular = cache.popular_queries(10).await.unwrap();

        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].query, "fresh");
        assert_eq!(cache.size().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_keeps_invariants() {
        let config = SemanticCacheConfig::new().with_max_size(16);
        let cache = Arc::new(create_cache(config, FixedEmbeddingProvider::new(256)));

        let writers = (0..64).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .set(&format!("query {}", i % 32), valid("answer"), 0.9)
                    .await
                    .unwrap();
            })
        });
        let readers = (0..64).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache.get(&format!("query {}", i % 40)).await.unwrap();
            })
        });

        let handles: Vec<_> = writers.chain(readers).collect();
        for result in join_all(handles).await {
            result.unwrap();
        }

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_queries, 64);
        assert_eq!(stats.cache_hits + stats.cache_misses, stats.total_queries);
        assert_eq!(stats.exact_hits + stats.semantic_hits, stats.cache_hits);
        assert!(stats.total_entries <= 16);
        assert_consistent(&cache);
    }
}
