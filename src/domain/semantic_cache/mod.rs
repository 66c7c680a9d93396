//! Semantic cache domain models, policies and traits
//!
//! Matches repeated queries exactly by normalized digest and near-duplicates
//! by embedding similarity, gating both writes and reads on answer quality.

mod config;
mod entry;
mod eviction;
mod key;
mod lookup;
mod repository;
mod response;
mod stats;
mod validator;

pub use config::{SemanticCacheConfig, DEFAULT_ERROR_PHRASES};
pub use entry::{CacheEntry, EntryId};
pub use eviction::{recency_factor, EvictionPolicy};
pub use key::{normalize_query, QueryDigest};
pub use lookup::{CacheHit, MatchType};
pub use repository::ResponseCache;
pub use response::CachedResponse;
pub use stats::{CacheStats, PopularQuery, SIMILARITY_EMA_ALPHA};
pub use validator::{Rejection, ResponseValidator};
