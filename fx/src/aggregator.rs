//! Runs every provider, merges their quotes and commits the result.

use ratekeeper_common::{Clock, CurrencyPair, HistoryRecord, RateEntry, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::{FxResult, ProviderError};
use crate::provider::{build_providers, normalize_source_name, RateProvider};
use crate::store::RateStore;

/// Outcome of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Timestamp shared by every record of the run.
    pub run_at: Option<Timestamp>,
    /// Pairs committed to the snapshot. Zero means nothing was written.
    pub pairs_updated: usize,
    /// Providers that answered, with how many pairs each returned.
    pub succeeded: Vec<(String, usize)>,
    /// Providers that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Providers excluded by the source filter.
    pub skipped: Vec<String>,
}

impl RunSummary {
    /// True if no provider produced anything.
    pub fn is_total_failure(&self) -> bool {
        self.pairs_updated == 0
    }
}

/// Orchestrates providers in a fixed order; later providers win ties.
pub struct RateAggregator {
    providers: Vec<Arc<dyn RateProvider>>,
    store: RateStore,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
}

impl RateAggregator {
    /// Create an aggregator over `providers`, consulted in the given order.
    pub fn new(
        providers: Vec<Arc<dyn RateProvider>>,
        store: RateStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            store,
            clock,
            fetch_timeout: Duration::from_secs(10),
        }
    }

    /// Build the configured providers and store.
    pub fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> FxResult<Self> {
        Ok(Self::new(build_providers(config)?, RateStore::from_config(config), clock)
            .with_fetch_timeout(config.request_timeout()))
    }

    /// Upper bound on a single provider call.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run providers (optionally only those named in `sources`) and commit the
    /// merged result.
    ///
    /// Provider failures are logged and skipped. Only a failed write is an
    /// error; in that case the previous on-disk state is left as it was.
    #[instrument(skip(self))]
    pub async fn run(&self, sources: Option<&[String]>) -> FxResult<RunSummary> {
        let run_at = self.clock.now();
        let filters: Vec<String> = sources
            .unwrap_or_default()
            .iter()
            .map(|s| normalize_source_name(s))
            .collect();

        info!(providers = self.providers.len(), "Starting rates update");

        let mut summary = RunSummary {
            run_at: Some(run_at),
            ..Default::default()
        };
        let mut pairs: BTreeMap<String, RateEntry> = BTreeMap::new();
        let mut records: BTreeMap<String, HistoryRecord> = BTreeMap::new();

        for provider in &self.providers {
            let name = provider.name();
            if !filters.is_empty() && !filters.contains(&normalize_source_name(name)) {
                summary.skipped.push(name.to_string());
                continue;
            }

            let rates = match tokio::time::timeout(self.fetch_timeout, provider.fetch_rates()).await
            {
                Ok(Ok(rates)) => rates,
                Ok(Err(e)) => {
                    warn!(provider = name, error = %e, "Failed to fetch rates");
                    summary.failed.push((name.to_string(), e.to_string()));
                    continue;
                }
                Err(_) => {
                    let e = ProviderError::Timeout(self.fetch_timeout);
                    warn!(provider = name, error = %e, "Failed to fetch rates");
                    summary.failed.push((name.to_string(), e.to_string()));
                    continue;
                }
            };

            info!(provider = name, rates = rates.len(), "Fetched rates");
            summary.succeeded.push((name.to_string(), rates.len()));

            for (key, quote) in rates {
                let pair = match CurrencyPair::from_key(&key) {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(provider = name, error = %e, "Skipping malformed pair");
                        continue;
                    }
                };

                let record = HistoryRecord::new(&pair, quote.rate, run_at, name, quote.meta);
                records.insert(record.id.clone(), record);
                pairs.insert(
                    pair.key(),
                    RateEntry {
                        rate: quote.rate,
                        updated_at: run_at,
                        source: name.to_string(),
                    },
                );
            }
        }

        if !filters.is_empty() && summary.skipped.len() == self.providers.len() {
            warn!(sources = ?sources, "No provider matches the source filter");
        }

        if pairs.is_empty() {
            warn!("No rates fetched, keeping previous snapshot");
            return Ok(summary);
        }

        let records: Vec<HistoryRecord> = records.into_values().collect();
        self.store.append_history(&records)?;
        let snapshot = self.store.save_snapshot(pairs, run_at)?;
        summary.pairs_updated = snapshot.len();

        info!(
            pairs = summary.pairs_updated,
            path = %self.store.rates_path().display(),
            "Rates committed"
        );
        Ok(summary)
    }

    /// Run and return only the number of pairs committed.
    pub async fn refresh(&self, sources: Option<&[String]>) -> FxResult<usize> {
        Ok(self.run(sources).await?.pairs_updated)
    }
}
