//! Response cache trait

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use super::lookup::CacheHit;
use super::response::CachedResponse;
use super::stats::{CacheStats, PopularQuery};
use crate::domain::DomainError;

/// Trait for query-to-answer caches consulted before running the RAG pipeline
///
/// A miss of any origin (never cached, expired, invalid, embedding failure)
/// is `Ok(None)`. Errors are reserved for broken internal state.
#[async_trait]
pub trait ResponseCache: Send + Sync + Debug {
    /// Look up a cached answer for `query`
    async fn get(&self, query: &str) -> Result<Option<CacheHit>, DomainError>;

    /// Cache an answer with the default TTL; invalid answers are skipped
    async fn set(
        &self,
        query: &str,
        response: CachedResponse,
        confidence: f32,
    ) -> Result<(), DomainError>;

    /// Cache an answer with an explicit TTL; invalid answers are skipped
    async fn set_with_ttl(
        &self,
        query: &str,
        response: CachedResponse,
        confidence: f32,
        ttl: Duration,
    ) -> Result<(), DomainError>;

    /// Remove the exact-match entry for `query`, if any
    async fn invalidate(&self, query: &str) -> Result<bool, DomainError>;

    /// Drop all entries; lifetime counters are kept
    async fn clear(&self) -> Result<(), DomainError>;

    /// Remove every expired entry, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize, DomainError>;

    /// Pre-populate the cache, returning how many pairs were accepted
    async fn warm_cache(
        &self,
        pairs: Vec<(String, CachedResponse)>,
    ) -> Result<usize, DomainError>;

    /// Snapshot of the cache statistics
    async fn stats(&self) -> Result<CacheStats, DomainError>;

    /// Most popular live entries, best first
    async fn popular_queries(&self, top_n: usize) -> Result<Vec<PopularQuery>, DomainError>;

    /// Number of live entries
    async fn size(&self) -> Result<usize, DomainError>;

    async fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.size().await? == 0)
    }
}
