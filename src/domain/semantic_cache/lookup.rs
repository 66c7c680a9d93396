//! Lookup outcome types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::response::CachedResponse;

/// How a cache hit was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    SemanticHigh,
    SemanticMedium,
}

impl MatchType {
    /// Classify a similarity score; `None` means the score is a miss
    pub fn classify(similarity: f32, threshold_high: f32, threshold_medium: f32) -> Option<Self> {
        if similarity >= threshold_high {
            Some(MatchType::SemanticHigh)
        } else if similarity >= threshold_medium {
            Some(MatchType::SemanticMedium)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::SemanticHigh => "semantic_high",
            MatchType::SemanticMedium => "semantic_medium",
        }
    }

    pub fn is_semantic(&self) -> bool {
        !matches!(self, MatchType::Exact)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A served cache hit; the response is a snapshot owned by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: CachedResponse,
    pub similarity: f32,
    pub match_type: MatchType,
}

impl CacheHit {
    pub fn new(response: CachedResponse, similarity: f32, match_type: MatchType) -> Self {
        Self {
            response,
            similarity,
            match_type,
        }
    }
}
