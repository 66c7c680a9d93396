//! Periodic removal of expired entries

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::semantic_cache::ResponseCache;

/// Background task calling `cleanup_expired` on a fixed interval
#[derive(Debug)]
pub struct ExpiryScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ExpiryScheduler {
    /// Spawn the task; the first sweep runs one full interval after start
    pub fn start(cache: Arc<dyn ResponseCache>, every: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.cleanup_expired().await {
                            Ok(removed) => debug!(removed, "Expiry sweep finished"),
                            Err(e) => error!("Expiry sweep failed: {}", e),
                        }
                    }
                    _ = stop.changed() => break,
                }
            }

            debug!("Expiry scheduler stopped");
        });

        info!(interval_secs = every.as_secs_f64(), "Expiry scheduler started");

        Self { shutdown, handle }
    }

    /// Stop the task and wait for an in-flight sweep to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.handle.await {
            error!("Expiry scheduler task failed: {}", e);
        }
    }
}
