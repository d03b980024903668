//! Crypto market-data provider (CoinGecko simple-price API).
//!
//! One request covers every tracked asset:
//! `GET <url>?ids=bitcoin,ethereum&vs_currencies=usd`, answered with
//! `{"bitcoin": {"usd": 60000.0}, ...}`.

use async_trait::async_trait;
use ratekeeper_common::{Currency, CurrencyPair, Meta};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{http_client, send_json, JsonReply, ProviderQuote, ProviderRates, RateProvider};
use crate::config::SyncConfig;
use crate::error::{FxResult, ProviderError};

const PROVIDER_NAME: &str = "CoinGecko";

/// A tracked crypto asset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedAsset {
    code: Currency,
    asset_id: String,
}

/// Fetches crypto prices against one quote currency.
pub struct CryptoProvider {
    client: Client,
    url: String,
    quote: Currency,
    assets: Vec<TrackedAsset>,
    timeout: Duration,
}

impl CryptoProvider {
    /// Create a provider for the crypto codes in `config`. Codes with no
    /// mapped asset id are skipped.
    pub fn new(config: &SyncConfig) -> FxResult<Self> {
        let assets = config
            .crypto_currencies
            .iter()
            .filter_map(|code| {
                let code = Currency::new(code).ok()?;
                match config.crypto_id_map.get(code.code()) {
                    Some(asset_id) => Some(TrackedAsset {
                        code,
                        asset_id: asset_id.clone(),
                    }),
                    None => {
                        warn!(code = %code, "No asset id mapped, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(Self {
            client: http_client(config.request_timeout())?,
            url: config.coingecko_url.clone(),
            quote: config.base_currency()?,
            assets,
            timeout: config.request_timeout(),
        })
    }

    /// Comma-joined asset ids for the request.
    fn ids_param(&self) -> String {
        self.assets
            .iter()
            .map(|a| a.asset_id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Turn a decoded reply into quotes. Assets missing from the reply are skipped.
    fn parse_quotes(&self, reply: &JsonReply) -> Result<ProviderRates, ProviderError> {
        let data = reply.body.as_object().ok_or_else(|| {
            ProviderError::InvalidResponse("expected a JSON object keyed by asset id".to_string())
        })?;
        let quote_key = self.quote.code_lower();

        let mut rates = ProviderRates::new();
        for asset in &self.assets {
            let Some(rate) = data
                .get(&asset.asset_id)
                .and_then(|prices| prices.get(&quote_key))
                .and_then(Value::as_f64)
            else {
                debug!(asset = %asset.asset_id, "No quote in response");
                continue;
            };

            let mut meta = Meta::new();
            meta.insert("raw_id".to_string(), json!(asset.asset_id));
            meta.insert("request_ms".to_string(), json!(reply.request_ms));
            meta.insert("status_code".to_string(), json!(reply.status));
            meta.insert(
                "etag".to_string(),
                json!(reply.etag.clone().unwrap_or_default()),
            );

            let pair = CurrencyPair::new(asset.code.clone(), self.quote.clone());
            rates.insert(pair.key(), ProviderQuote::new(rate, meta));
        }

        Ok(rates)
    }
}

#[async_trait]
impl RateProvider for CryptoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_rates(&self) -> Result<ProviderRates, ProviderError> {
        if self.assets.is_empty() {
            return Ok(ProviderRates::new());
        }

        let request = self.client.get(&self.url).query(&[
            ("ids", self.ids_param()),
            ("vs_currencies", self.quote.code_lower()),
        ]);
        let reply = send_json(request, self.timeout).await?;

        debug!(
            provider = PROVIDER_NAME,
            status = reply.status,
            request_ms = reply.request_ms,
            "Received market data"
        );

        self.parse_quotes(&reply)
    }
}
