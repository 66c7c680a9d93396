//! Domain layer - Core cache entities, policies and traits

pub mod embedding;
pub mod error;
pub mod semantic_cache;

pub use embedding::{cosine_similarity, EmbeddingProvider};
pub use error::DomainError;
pub use semantic_cache::{
    CacheEntry, CacheHit, CacheStats, CachedResponse, EvictionPolicy, MatchType, PopularQuery,
    ResponseCache, ResponseValidator, SemanticCacheConfig,
};
