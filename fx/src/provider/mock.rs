//! Mock rate provider for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use ratekeeper_common::Meta;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ProviderQuote, ProviderRates, RateProvider};
use crate::error::ProviderError;

/// A provider that returns canned rates or a canned failure and counts calls.
pub struct MockRateProvider {
    name: String,
    rates: Mutex<Option<ProviderRates>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRateProvider {
    /// Create a provider that succeeds with no rates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: Mutex::new(Some(ProviderRates::new())),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a provider that succeeds with the given `(pair key, rate)` list.
    pub fn with_rates(name: impl Into<String>, rates: &[(&str, f64)]) -> Self {
        let provider = Self::new(name);
        for (key, rate) in rates {
            provider.set_rate(key, *rate);
        }
        provider
    }

    /// Create a provider whose every call fails.
    pub fn failing(name: impl Into<String>) -> Self {
        let provider = Self::new(name);
        provider.fail();
        provider
    }

    /// Delay every call, to exercise timeouts and concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a rate for a pair key. Turns a failing provider back into a succeeding one.
    pub fn set_rate(&self, key: &str, rate: f64) {
        let mut meta = Meta::new();
        meta.insert("mock".to_string(), json!(self.name));
        self.rates
            .lock()
            .get_or_insert_with(ProviderRates::new)
            .insert(key.to_string(), ProviderQuote::new(rate, meta));
    }

    /// Make subsequent calls fail.
    pub fn fail(&self) {
        *self.rates.lock() = None;
    }

    /// Number of `fetch_rates` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> Result<ProviderRates, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.rates
            .lock()
            .clone()
            .ok_or_else(|| ProviderError::Network(format!("{} is down", self.name)))
    }
}
