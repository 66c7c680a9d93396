//! Semantic cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Phrases that mark a generated answer as a fallback or error message
pub const DEFAULT_ERROR_PHRASES: &[&str] = &[
    "no response generated",
    "an error occurred",
    "no relevant documents found",
    "try again",
    "contact support",
    "i don't have enough information",
    "unable to generate",
];

/// Configuration for the semantic response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Maximum number of live entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Time-to-live for entries stored without an explicit TTL
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Similarity at or above which a semantic match is `semantic_high`
    #[serde(default = "default_similarity_threshold_high")]
    pub similarity_threshold_high: f32,

    /// Similarity at or above which a semantic match is `semantic_medium`
    #[serde(default = "default_similarity_threshold_medium")]
    pub similarity_threshold_medium: f32,

    /// Whether lookups fall back to embedding similarity after an exact miss
    #[serde(default = "default_true")]
    pub enable_semantic_search: bool,

    /// Case-insensitive substrings that disqualify a response
    #[serde(default = "default_error_phrase_denylist")]
    pub error_phrase_denylist: Vec<String>,

    /// Minimum response confidence worth caching or serving
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_max_size() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_similarity_threshold_high() -> f32 {
    0.95
}

fn default_similarity_threshold_medium() -> f32 {
    0.85
}

fn default_true() -> bool {
    true
}

fn default_error_phrase_denylist() -> Vec<String> {
    DEFAULT_ERROR_PHRASES.iter().map(|p| p.to_string()).collect()
}

fn default_min_confidence() -> f32 {
    0.3
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            default_ttl_secs: default_ttl_secs(),
            similarity_threshold_high: default_similarity_threshold_high(),
            similarity_threshold_medium: default_similarity_threshold_medium(),
            enable_semantic_search: default_true(),
            error_phrase_denylist: default_error_phrase_denylist(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the default TTL as Duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn with_max_size(mut self, max: usize) -> Self {
        self.max_size = max;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }

    /// Set both similarity thresholds
    pub fn with_thresholds(mut self, high: f32, medium: f32) -> Self {
        self.similarity_threshold_high = high;
        self.similarity_threshold_medium = medium;
        self
    }

    pub fn with_semantic_search(mut self, enabled: bool) -> Self {
        self.enable_semantic_search = enabled;
        self
    }

    /// Replace the error phrase denylist
    pub fn with_error_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_phrase_denylist = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_confidence(mut self, min: f32) -> Self {
        self.min_confidence = min;
        self
    }

    /// Reject configurations that would leave cache behavior undefined
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_size == 0 {
            return Err(DomainError::configuration("max_size must be positive"));
        }

        let high = self.similarity_threshold_high;
        let medium = self.similarity_threshold_medium;

        if !(0.0..=1.0).contains(&high) {
            return Err(DomainError::configuration(format!(
                "similarity_threshold_high must be within [0, 1], got {}",
                high
            )));
        }

        if !(0.0..=1.0).contains(&medium) {
            return Err(DomainError::configuration(format!(
                "similarity_threshold_medium must be within [0, 1], got {}",
                medium
            )));
        }

        if medium > high {
            return Err(DomainError::configuration(format!(
                "similarity_threshold_medium ({}) exceeds similarity_threshold_high ({})",
                medium, high
            )));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(DomainError::configuration(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }

        Ok(())
    }
}
