//! Periodic background refresh.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::engine::RateEngine;

/// Refreshes every provider on a fixed interval until shut down.
pub struct RateScheduler {
    engine: Arc<RateEngine>,
    interval: Duration,
    error_backoff: Duration,
}

impl RateScheduler {
    pub fn new(engine: Arc<RateEngine>, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            engine,
            interval,
            error_backoff,
        }
    }

    pub fn from_config(engine: Arc<RateEngine>, config: &SyncConfig) -> Self {
        Self::new(engine, config.refresh_interval(), config.error_backoff())
    }

    /// Run immediately, then after every `interval`; a run that fails or
    /// fetches nothing waits `error_backoff` instead. Returns the number of
    /// runs once `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut runs = 0usize;

        info!(
            interval_secs = self.interval.as_secs(),
            backoff_secs = self.error_backoff.as_secs(),
            "Rate scheduler started"
        );

        loop {
            let delay = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                result = self.engine.run(None) => {
                    runs += 1;
                    match result {
                        Ok(summary) if !summary.is_total_failure() => {
                            info!(
                                run = runs,
                                pairs = summary.pairs_updated,
                                failed = summary.failed.len(),
                                "Scheduled refresh complete"
                            );
                            self.interval
                        }
                        Ok(_) => {
                            warn!(run = runs, "Scheduled refresh fetched nothing");
                            self.error_backoff
                        }
                        Err(e) => {
                            error!(run = runs, error = %e, "Scheduled refresh failed");
                            self.error_backoff
                        }
                    }
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(runs, "Rate scheduler stopped");
        runs
    }
}
