//! Cached response payload

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A generated answer as stored by the cache
///
/// Only `text`, `confidence_score` and `sources` are ever inspected; every
/// other field of the pipeline's answer is carried in `extra` and round-trips
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The answer text
    pub text: String,
    /// Generator confidence in [0, 1]
    #[serde(default)]
    pub confidence_score: f32,
    /// Source citations backing the answer
    #[serde(default)]
    pub sources: Vec<Value>,
    /// Opaque fields the cache must preserve but never interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedResponse {
    /// Create a response with no confidence and no sources
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence_score: 0.0,
            sources: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence_score = confidence;
        self
    }

    /// Attach a source citation
    pub fn with_source(mut self, source: Value) -> Self {
        self.sources.push(source);
        self
    }

    /// Attach an opaque field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
