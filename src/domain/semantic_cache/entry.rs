//! Cache entry model

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::eviction::recency_factor;
use super::key::QueryDigest;
use super::response::CachedResponse;

/// Process-local identifier of a stored entry; also its insertion order
pub type EntryId = u64;

/// One cached query/response pair plus access bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    #[serde(skip)]
    id: EntryId,
    #[serde(skip)]
    key: QueryDigest,
    query: String,
    #[serde(skip)]
    query_embedding: Vec<f32>,
    response: CachedResponse,
    confidence: f32,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    access_count: u64,
    ttl_secs: u64,
    popularity_score: f64,
}

impl CacheEntry {
    /// Create a fresh entry that has never been accessed
    pub fn new(
        id: EntryId,
        query: impl Into<String>,
        query_embedding: Vec<f32>,
        response: CachedResponse,
        confidence: f32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let query = query.into();

        Self {
            id,
            key: QueryDigest::from_query(&query),
            query,
            query_embedding,
            response,
            confidence,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl_secs: ttl.as_secs(),
            popularity_score: 0.0,
        }
    }

    /// Carry access history over from an entry this one replaces
    pub fn with_access_count(mut self, access_count: u64) -> Self {
        self.access_count = access_count;
        self.popularity_score = self.access_count as f64;
        self
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn key(&self) -> &QueryDigest {
        &self.key
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn query_embedding(&self) -> &[f32] {
        &self.query_embedding
    }

    pub fn response(&self) -> &CachedResponse {
        &self.response
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn popularity_score(&self) -> f64 {
        self.popularity_score
    }

    /// Whether the TTL has elapsed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.created_at).num_milliseconds();
        let ttl_ms = i64::try_from(self.ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        age_ms >= ttl_ms
    }

    /// Record a served hit and refresh the popularity score
    ///
    /// Popularity decays from `created_at`, not from the previous access.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.popularity_score = self.access_count as f64 * recency_factor(self.created_at, now);
    }

    #[cfg(test)]
    pub(crate) fn response_mut(&mut self) -> &mut CachedResponse {
        &mut self.response
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: chrono::Duration) {
        self.created_at -= by;
        self.last_accessed_at -= by;
    }
}
