//! Observability infrastructure - Logging and Metrics

mod config;
mod logging;
pub mod metrics;

pub use self::config::MetricsConfig;
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use self::metrics::{init_metrics, PrometheusMetrics};
