//! Prometheus metrics infrastructure

use std::sync::Arc;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;
use crate::domain::semantic_cache::{MatchType, Rejection};

/// Prometheus metrics handle for rendering the exposition text
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("rag_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!("Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Record a finished lookup; `None` is a miss
pub fn record_lookup(outcome: Option<MatchType>) {
    let result = outcome.map(|m| m.as_str()).unwrap_or("miss");
    counter!("semantic_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_eviction() {
    counter!("semantic_cache_evictions_total").increment(1);
}

/// Record a response refused by the validator at `stage` ("write" or "read")
pub fn record_rejection(stage: &'static str, rejection: &Rejection) {
    counter!(
        "semantic_cache_rejections_total",
        "stage" => stage,
        "reason" => rejection.as_str()
    )
    .increment(1);
}

pub fn record_embedding_failure(provider: &'static str) {
    counter!("semantic_cache_embedding_failures_total", "provider" => provider).increment(1);
}

pub fn record_expired(count: usize) {
    if count > 0 {
        counter!("semantic_cache_expired_total").increment(count as u64);
    }
}

pub fn record_size(size: usize) {
    gauge!("semantic_cache_entries").set(size as f64);
}
