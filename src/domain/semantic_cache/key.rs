//! Exact-match key derivation

use std::fmt;

use sha2::{Digest, Sha256};

/// Normalize a query for exact matching (trimmed, lower-cased)
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// SHA-256 digest of a normalized query, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDigest(String);

impl QueryDigest {
    /// Digest the normalized form of `query`
    pub fn from_query(query: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_query(query).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
