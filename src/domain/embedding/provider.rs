//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Trait for embedding providers (OpenAI-compatible endpoints, local models, etc.)
///
/// Implementations must be deterministic for a fixed model version. Timeouts
/// and cancellation are the provider's concern and surface as errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate an embedding vector for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the embedding dimensions, when known up front
    fn dimensions(&self) -> Option<usize>;
}
