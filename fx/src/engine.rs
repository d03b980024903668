//! Consumer-facing rate engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ratekeeper_common::{Clock, Currency, CurrencyRegistry, Snapshot, SystemClock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::{RateAggregator, RunSummary};
use crate::cache::{ListQuery, RateCache, RateListing, RateQuote, RateTable};
use crate::config::SyncConfig;
use crate::error::{FxResult, LookupError};
use crate::freshness::FreshnessGate;
use crate::provider::{build_providers, RateProvider};
use crate::store::RateStore;

/// Serves rates from the cached snapshot, refreshing it first when stale.
pub struct RateEngine {
    store: RateStore,
    aggregator: RateAggregator,
    gate: FreshnessGate,
    registry: CurrencyRegistry,
    quote: Currency,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl RateEngine {
    /// Create an engine from its parts.
    pub fn new(
        aggregator: RateAggregator,
        store: RateStore,
        gate: FreshnessGate,
        registry: CurrencyRegistry,
        quote: Currency,
    ) -> Self {
        Self {
            store,
            aggregator,
            gate,
            registry,
            quote,
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Create an engine with the configured providers and the system clock.
    pub fn from_config(config: &SyncConfig) -> FxResult<Self> {
        Self::with_providers(config, build_providers(config)?, Arc::new(SystemClock))
    }

    /// Create an engine with explicit providers and clock.
    pub fn with_providers(
        config: &SyncConfig,
        providers: Vec<Arc<dyn RateProvider>>,
        clock: Arc<dyn Clock>,
    ) -> FxResult<Self> {
        config.validate()?;
        let store = RateStore::from_config(config);
        let aggregator = RateAggregator::new(providers, store.clone(), clock.clone())
            .with_fetch_timeout(config.request_timeout());

        Ok(Self::new(
            aggregator,
            store,
            FreshnessGate::new(config.rates_ttl(), clock),
            config.registry(),
            config.base_currency()?,
        ))
    }

    /// Currency every stored rate is quoted in.
    pub fn quote_currency(&self) -> &Currency {
        &self.quote
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &RateStore {
        &self.store
    }

    pub fn aggregator(&self) -> &RateAggregator {
        &self.aggregator
    }

    /// All rates quoted in `quote`, keyed by base code. Never fails: an
    /// invalid code or an empty cache yields an empty table.
    #[instrument(skip(self))]
    pub async fn get_rates(&self, quote: &str) -> RateTable {
        let Ok(quote) = Currency::new(quote) else {
            debug!("Invalid quote currency");
            return RateTable::default();
        };

        match self.fresh_snapshot().await {
            Some(snapshot) => RateCache::new(snapshot).rates_quoted_in(&quote),
            None => RateTable::default(),
        }
    }

    /// Rate and reverse rate for `from -> to`.
    #[instrument(skip(self))]
    pub async fn get_rate(&self, from: &str, to: &str) -> Result<RateQuote, LookupError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;

        let snapshot = self.fresh_snapshot().await.ok_or(LookupError::NoData)?;
        RateCache::new(snapshot).quote(&from, &to)
    }

    /// Listing served from whatever is cached; never triggers a refresh.
    pub fn list_rates(&self, query: &ListQuery) -> Result<RateListing, LookupError> {
        for currency in query.currency.iter().chain(query.base.iter()) {
            if !self.registry.contains(currency) {
                return Err(LookupError::UnknownCurrency(currency.to_string()));
            }
        }

        let snapshot = self.store.load_snapshot().ok_or(LookupError::NoData)?;
        RateCache::new(snapshot).list(query, &self.quote, &self.registry)
    }

    /// Run the aggregator now, regardless of freshness.
    pub async fn refresh(&self, sources: Option<&[String]>) -> FxResult<usize> {
        Ok(self.run(sources).await?.pairs_updated)
    }

    /// Like [`refresh`](Self::refresh), but returns the full run summary.
    pub async fn run(&self, sources: Option<&[String]>) -> FxResult<RunSummary> {
        let _guard = self.refresh_lock.lock().await;
        let summary = self.aggregator.run(sources).await;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        summary
    }

    fn resolve(&self, code: &str) -> Result<Currency, LookupError> {
        self.registry
            .resolve(code)
            .map(|(currency, _)| currency)
            .ok_or_else(|| LookupError::UnknownCurrency(code.trim().to_uppercase()))
    }

    /// Current snapshot, refreshed first if stale. Concurrent stale callers
    /// share one aggregation run.
    async fn fresh_snapshot(&self) -> Option<Snapshot> {
        let snapshot = self.store.load_snapshot();
        if !self.gate.is_stale(snapshot.as_ref()) {
            return snapshot.filter(|s| !s.is_empty());
        }

        let seen = self.refreshes.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        let snapshot = self.store.load_snapshot();
        if self.refreshes.load(Ordering::SeqCst) != seen || !self.gate.is_stale(snapshot.as_ref())
        {
            debug!("Snapshot refreshed by another caller");
            return snapshot.filter(|s| !s.is_empty());
        }

        info!(
            age_secs = snapshot
                .as_ref()
                .and_then(|s| self.gate.age(s))
                .map(|age| age.num_seconds()),
            "Rates are stale, refreshing"
        );
        match self.aggregator.run(None).await {
            Ok(summary) if summary.is_total_failure() => {
                warn!("Refresh fetched nothing, serving previous snapshot")
            }
            Ok(summary) => debug!(pairs = summary.pairs_updated, "Refresh complete"),
            Err(e) => warn!(error = %e, "Refresh failed, serving previous snapshot"),
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        self.store.load_snapshot().filter(|s| !s.is_empty())
    }
}
