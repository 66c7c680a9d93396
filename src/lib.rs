//! RAG Response Cache
//!
//! A response cache consulted before running a retrieval-augmented
//! generation pipeline:
//! - Exact matching on a digest of the normalized query
//! - Semantic matching on embedding cosine similarity, graded high/medium
//! - A validity gate on both writes and reads
//! - Popularity/recency eviction and TTL expiry
//! - Statistics and popular-query analytics for threshold tuning

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;
pub use domain::{
    CacheHit, CacheStats, CachedResponse, DomainError, EmbeddingProvider, MatchType,
    PopularQuery, ResponseCache, SemanticCacheConfig,
};
pub use infrastructure::semantic_cache::{ExpiryScheduler, SemanticCache};
