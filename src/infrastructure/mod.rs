//! Infrastructure layer - Cache engine, embedding adapters and observability

pub mod embedding;
pub mod observability;
pub mod semantic_cache;
