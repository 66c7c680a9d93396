//! Entry storage: an exact-match index and a similarity index over one entry set

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::embedding::cosine_similarity;
use crate::domain::semantic_cache::{CacheEntry, EntryId, QueryDigest, ResponseValidator};

/// Digest-keyed lookup for exact repeats
#[derive(Debug, Default)]
pub struct ExactIndex {
    ids: HashMap<QueryDigest, EntryId>,
}

impl ExactIndex {
    pub fn get(&self, key: &QueryDigest) -> Option<EntryId> {
        self.ids.get(key).copied()
    }

    pub fn put(&mut self, key: QueryDigest, id: EntryId) -> Option<EntryId> {
        self.ids.insert(key, id)
    }

    pub fn remove(&mut self, key: &QueryDigest) -> Option<EntryId> {
        self.ids.remove(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Result of a linear similarity scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Best-scoring live entry and its similarity
    pub best: Option<(EntryId, f32)>,
    /// Entries whose similarity was computed
    pub compared: usize,
    /// Expired or invalid entries seen during the scan
    pub stale: Vec<EntryId>,
    similarity_sum: f64,
}

impl ScanOutcome {
    /// Mean similarity over every compared entry
    pub fn mean_similarity(&self) -> Option<f64> {
        if self.compared == 0 {
            return None;
        }

        Some(self.similarity_sum / self.compared as f64)
    }
}

/// All live entries in insertion order, scanned for the closest embedding
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    entries: BTreeMap<EntryId, CacheEntry>,
}

impl SimilarityIndex {
    pub fn get(&self, id: EntryId) -> Option<&CacheEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the live entry closest to `embedding`
    ///
    /// Ties keep the earliest-inserted entry. Entries stored without an
    /// embedding are not compared.
    pub fn scan(
        &self,
        embedding: &[f32],
        now: DateTime<Utc>,
        validator: &ResponseValidator,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for entry in self.entries.values() {
            if entry.is_expired_at(now) || !validator.is_valid(entry.response()) {
                outcome.stale.push(entry.id());
                continue;
            }

            if entry.query_embedding().is_empty() {
                continue;
            }

            let similarity = cosine_similarity(embedding, entry.query_embedding());

            if !similarity.is_finite() {
                continue;
            }

            outcome.compared += 1;
            outcome.similarity_sum += similarity as f64;

            match outcome.best {
                Some((_, best)) if similarity <= best => {}
                _ => outcome.best = Some((entry.id(), similarity)),
            }
        }

        outcome
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.id(), entry);
    }

    fn remove(&mut self, id: EntryId) -> Option<CacheEntry> {
        self.entries.remove(&id)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Both indexes, only ever mutated together
#[derive(Debug, Default)]
pub struct EntryStore {
    exact: ExactIndex,
    similarity: SimilarityIndex,
    next_id: EntryId,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for the next inserted entry
    pub fn allocate_id(&mut self) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert an entry, replacing any entry with the same exact key
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let replaced = self
            .exact
            .put(entry.key().clone(), entry.id())
            .and_then(|old_id| self.similarity.remove(old_id));

        self.similarity.insert(entry);
        replaced
    }

    pub fn lookup_exact(&self, key: &QueryDigest) -> Option<&CacheEntry> {
        self.exact.get(key).and_then(|id| self.similarity.get(id))
    }

    pub fn get(&self, id: EntryId) -> Option<&CacheEntry> {
        self.similarity.get(id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry> {
        self.similarity.get_mut(id)
    }

    /// Remove an entry from both indexes
    pub fn remove(&mut self, id: EntryId) -> Option<CacheEntry> {
        let entry = self.similarity.remove(id)?;

        if self.exact.get(entry.key()) == Some(id) {
            self.exact.remove(entry.key());
        }

        Some(entry)
    }

    pub fn remove_by_key(&mut self, key: &QueryDigest) -> Option<CacheEntry> {
        let id = self.exact.get(key)?;
        self.remove(id)
    }

    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<EntryId> {
        self.similarity
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.id())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.similarity.iter()
    }

    pub fn scan(
        &self,
        embedding: &[f32],
        now: DateTime<Utc>,
        validator: &ResponseValidator,
    ) -> ScanOutcome {
        self.similarity.scan(embedding, now, validator)
    }

    pub fn len(&self) -> usize {
        self.similarity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.similarity.is_empty()
    }

    pub fn clear(&mut self) {
        self.exact.clear();
        self.similarity.clear();
    }

    /// Every exact key points at a live entry and every entry is keyed
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.exact.len() == self.similarity.len()
            && self
                .similarity
                .iter()
                .all(|entry| self.exact.get(entry.key()) == Some(entry.id()))
    }
}
