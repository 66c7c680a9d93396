//! Response validity gate
//!
//! Applied when writing (never cache a degenerate answer) and when reading
//! (never replay one that the current rules consider invalid).

use std::fmt;

use regex::{RegexSet, RegexSetBuilder};

use super::response::CachedResponse;
use crate::domain::DomainError;

/// Why a response was refused
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    EmptyText,
    ErrorPhrase(String),
    LowConfidence(f32),
    NoSources,
}

impl Rejection {
    /// Short label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::EmptyText => "empty_text",
            Rejection::ErrorPhrase(_) => "error_phrase",
            Rejection::LowConfidence(_) => "low_confidence",
            Rejection::NoSources => "no_sources",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyText => write!(f, "response text is empty"),
            Rejection::ErrorPhrase(phrase) => {
                write!(f, "response contains error phrase '{}'", phrase)
            }
            Rejection::LowConfidence(score) => write!(f, "confidence {} is too low", score),
            Rejection::NoSources => write!(f, "response has no sources"),
        }
    }
}

/// Decides whether a response is worth caching or serving
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    phrases: Vec<String>,
    matcher: RegexSet,
    min_confidence: f32,
}

impl ResponseValidator {
    /// Build a validator from a phrase denylist; blank phrases are ignored
    pub fn new<I, S>(phrases: I, min_confidence: f32) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let matcher = RegexSetBuilder::new(phrases.iter().map(|p| regex::escape(p)))
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Invalid error phrase denylist: {}", e))
            })?;

        Ok(Self {
            phrases,
            matcher,
            min_confidence,
        })
    }

    /// Check a response against every rule, reporting the first failure
    pub fn check(&self, response: &CachedResponse) -> Result<(), Rejection> {
        if response.text.trim().is_empty() {
            return Err(Rejection::EmptyText);
        }

        if let Some(idx) = self.matcher.matches(&response.text).iter().next() {
            return Err(Rejection::ErrorPhrase(self.phrases[idx].clone()));
        }

        // NaN fails this comparison too
        if !(response.confidence_score >= self.min_confidence) {
            return Err(Rejection::LowConfidence(response.confidence_score));
        }

        if response.sources.is_empty() {
            return Err(Rejection::NoSources);
        }

        Ok(())
    }

    pub fn is_valid(&self, response: &CachedResponse) -> bool {
        self.check(response).is_ok()
    }
}
