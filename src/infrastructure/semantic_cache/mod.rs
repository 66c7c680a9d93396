//! Semantic cache implementations

mod in_memory;
mod scheduler;
mod store;

pub use in_memory::SemanticCache;
pub use scheduler::ExpiryScheduler;
pub use store::{EntryStore, ExactIndex, ScanOutcome, SimilarityIndex};
