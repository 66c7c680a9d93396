//! Popularity/recency eviction policy

use chrono::{DateTime, Utc};

use super::entry::{CacheEntry, EntryId};

/// Age at which the recency factor has halved
const RECENCY_DECAY_SECS: f64 = 3600.0;

/// `1 / (1 + age / 1h)`; ages in the future count as zero
pub fn recency_factor(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - since).num_milliseconds().max(0) as f64 / 1000.0;
    1.0 / (1.0 + age_secs / RECENCY_DECAY_SECS)
}

/// Chooses which entry to drop when the cache is full
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionPolicy;

impl EvictionPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Popularity further decayed by time since the last access
    ///
    /// Old entries that keep getting hit stay protected; old and idle ones are
    /// penalized by both factors.
    pub fn eviction_score(&self, entry: &CacheEntry, now: DateTime<Utc>) -> f64 {
        entry.popularity_score() * recency_factor(entry.last_accessed_at(), now)
    }

    /// Entry with the lowest eviction score; earlier entries win ties
    pub fn select_victim<'a, I>(&self, entries: I, now: DateTime<Utc>) -> Option<EntryId>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        let mut victim: Option<(EntryId, f64)> = None;

        for entry in entries {
            let score = self.eviction_score(entry, now);

            match victim {
                Some((_, lowest)) if score >= lowest => {}
                _ => victim = Some((entry.id(), score)),
            }
        }

        victim.map(|(id, _)| id)
    }
}
