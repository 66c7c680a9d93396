//! Cache statistics

use serde::{Deserialize, Serialize};

use super::lookup::MatchType;

/// Weight of the newest scan in the running similarity average
pub const SIMILARITY_EMA_ALPHA: f64 = 0.1;

/// Process-lifetime counters for one cache instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries at snapshot time
    pub total_entries: usize,
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub evictions: u64,
    pub total_similarity_searches: u64,
    /// Exponential moving average of per-scan mean similarity
    pub avg_similarity_score: f64,
    pub embedding_failures: u64,
}

impl CacheStats {
    /// Fraction of queries answered from the cache
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }

        self.cache_hits as f64 / self.total_queries as f64
    }

    /// Fraction of hits that came from the similarity search
    pub fn semantic_hit_rate(&self) -> f64 {
        if self.cache_hits == 0 {
            return 0.0;
        }

        self.semantic_hits as f64 / self.cache_hits as f64
    }

    /// Count one finished lookup
    pub fn record_lookup(&mut self, outcome: Option<MatchType>) {
        self.total_queries += 1;

        match outcome {
            Some(MatchType::Exact) => {
                self.cache_hits += 1;
                self.exact_hits += 1;
            }
            Some(MatchType::SemanticHigh | MatchType::SemanticMedium) => {
                self.cache_hits += 1;
                self.semantic_hits += 1;
            }
            None => self.cache_misses += 1,
        }
    }

    /// Fold one similarity scan into the running average
    ///
    /// `mean` is the mean similarity over every entry compared in the scan.
    pub fn record_similarity_scan(&mut self, mean: Option<f64>) {
        self.total_similarity_searches += 1;

        if let Some(mean) = mean {
            self.avg_similarity_score =
                SIMILARITY_EMA_ALPHA * mean + (1.0 - SIMILARITY_EMA_ALPHA) * self.avg_similarity_score;
        }
    }
}

/// A frequently served query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularQuery {
    pub query: String,
    pub access_count: u64,
    pub popularity_score: f64,
}
