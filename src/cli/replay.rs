//! Replay command - feeds a recorded workload through the cache for threshold tuning

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::semantic_cache::{CacheStats, CachedResponse, PopularQuery, ResponseCache};
use crate::domain::DomainError;
use crate::infrastructure::embedding::{HttpClient, OpenAiEmbeddingProvider};
use crate::infrastructure::observability::{init_logging, init_metrics};
use crate::infrastructure::semantic_cache::{ExpiryScheduler, SemanticCache};

/// Arguments for the replay command
#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// JSONL workload; lines with a `response` are stored, the rest are looked up
    #[arg(long)]
    pub workload: PathBuf,

    /// Number of popular queries to report
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Override `cache.similarity_threshold_high`
    #[arg(long)]
    pub threshold_high: Option<f32>,

    /// Override `cache.similarity_threshold_medium`
    #[arg(long)]
    pub threshold_medium: Option<f32>,

    /// Override `cache.max_size`
    #[arg(long)]
    pub max_size: Option<usize>,
}

/// One workload line as written on disk
#[derive(Debug, Deserialize)]
struct WorkloadLine {
    query: String,
    #[serde(default)]
    response: Option<CachedResponse>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    ttl_secs: Option<u64>,
}

/// A parsed workload step
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadEvent {
    Set {
        query: String,
        response: CachedResponse,
        confidence: f32,
        ttl: Option<Duration>,
    },
    Get {
        query: String,
    },
}

impl From<WorkloadLine> for WorkloadEvent {
    fn from(line: WorkloadLine) -> Self {
        match line.response {
            Some(response) => WorkloadEvent::Set {
                confidence: line.confidence.unwrap_or(response.confidence_score),
                query: line.query,
                response,
                ttl: line.ttl_secs.map(Duration::from_secs),
            },
            None => WorkloadEvent::Get { query: line.query },
        }
    }
}

/// Parse a JSONL workload; blank lines are skipped
pub fn parse_workload(source: &str) -> Result<Vec<WorkloadEvent>, DomainError> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<WorkloadLine>(line)
                .map(WorkloadEvent::from)
                .map_err(|e| DomainError::validation(format!("workload line {}: {}", idx + 1, e)))
        })
        .collect()
}

/// Counts gathered while replaying
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub writes: usize,
    pub lookups: usize,
    pub hits: usize,
}

/// Run every event against `cache` in order
pub async fn run_workload(
    cache: &dyn ResponseCache,
    events: Vec<WorkloadEvent>,
) -> Result<ReplaySummary, DomainError> {
    let mut summary = ReplaySummary::default();

    for event in events {
        match event {
            WorkloadEvent::Set {
                query,
                response,
                confidence,
                ttl,
            } => {
                match ttl {
                    Some(ttl) => cache.set_with_ttl(&query, response, confidence, ttl).await?,
                    None => cache.set(&query, response, confidence).await?,
                }
                summary.writes += 1;
            }
            WorkloadEvent::Get { query } => {
                summary.lookups += 1;

                match cache.get(&query).await? {
                    Some(hit) => {
                        summary.hits += 1;
                        info!(
                            query = %query,
                            match_type = %hit.match_type,
                            similarity = hit.similarity,
                            "hit"
                        );
                    }
                    None => info!(query = %query, "miss"),
                }
            }
        }
    }

    Ok(summary)
}

/// Final output of a replay
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub summary: ReplaySummary,
    pub hit_rate: f64,
    pub semantic_hit_rate: f64,
    pub stats: CacheStats,
    pub popular_queries: Vec<PopularQuery>,
}

impl ReplayReport {
    pub fn new(summary: ReplaySummary, stats: CacheStats, popular_queries: Vec<PopularQuery>) -> Self {
        Self {
            summary,
            hit_rate: stats.hit_rate(),
            semantic_hit_rate: stats.semantic_hit_rate(),
            stats,
            popular_queries,
        }
    }
}

fn apply_overrides(config: &mut AppConfig, args: &ReplayArgs) {
    if let Some(high) = args.threshold_high {
        config.cache.similarity_threshold_high = high;
    }
    if let Some(medium) = args.threshold_medium {
        config.cache.similarity_threshold_medium = medium;
    }
    if let Some(max_size) = args.max_size {
        config.cache.max_size = max_size;
    }
}

fn build_cache(config: &AppConfig) -> Result<SemanticCache, DomainError> {
    let client = HttpClient::with_timeout(config.embedding.timeout())?;

    let mut provider = OpenAiEmbeddingProvider::with_base_url(
        client,
        &config.embedding.api_key,
        &config.embedding.base_url,
    )
    .with_model(&config.embedding.model);

    if let Some(dimensions) = config.embedding.dimensions {
        provider = provider.with_dimensions(dimensions);
    }

    SemanticCache::new(config.cache.clone(), Arc::new(provider))
}

/// Loaded configuration with command-line overrides applied
fn resolve_config(
    loaded: Result<AppConfig, config::ConfigError>,
    args: &ReplayArgs,
) -> anyhow::Result<AppConfig> {
    let mut config = loaded.context("Failed to load configuration")?;
    apply_overrides(&mut config, args);

    Ok(config)
}

/// Run the replay command
pub async fn run(args: ReplayArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = resolve_config(AppConfig::load(), &args)?;

    init_logging(&config.logging);
    let metrics = init_metrics(&config.metrics);

    let source = tokio::fs::read_to_string(&args.workload)
        .await
        .with_context(|| format!("Failed to read workload {}", args.workload.display()))?;
    let events = parse_workload(&source)?;
    debug!(events = events.len(), "Workload parsed");

    let cache = Arc::new(build_cache(&config)?);

    let scheduler = config
        .cleanup
        .enabled
        .then(|| ExpiryScheduler::start(cache.clone(), config.cleanup.interval()));

    let summary = run_workload(cache.as_ref(), events).await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    let report = ReplayReport::new(
        summary,
        cache.stats().await?,
        cache.popular_queries(args.top).await?,
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(metrics) = metrics {
        println!("{}", metrics.render());
    }

    info!("Replay complete");

    Ok(())
}
