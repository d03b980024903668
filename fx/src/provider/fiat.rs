//! Fiat FX provider (ExchangeRate-API v6).
//!
//! `GET <url>/<api key>/latest/<QUOTE>` returns how many units of each fiat
//! currency one unit of the quote currency buys. Stored rates are the
//! other way around (quote currency per unit of fiat), so every value is
//! inverted.

use async_trait::async_trait;
use ratekeeper_common::{Currency, CurrencyPair, Meta};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{http_client, send_json, JsonReply, ProviderQuote, ProviderRates, RateProvider};
use crate::config::SyncConfig;
use crate::error::{FxResult, ProviderError};

const PROVIDER_NAME: &str = "ExchangeRate-API";

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(default)]
    conversion_rates: Option<HashMap<String, f64>>,
    #[serde(default)]
    time_last_update_utc: Option<String>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

/// Fetches fiat rates anchored at the configured quote currency.
pub struct FiatProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
    quote: Currency,
    currencies: Vec<Currency>,
    timeout: Duration,
}

impl FiatProvider {
    pub fn new(config: &SyncConfig) -> FxResult<Self> {
        let quote = config.base_currency()?;
        let currencies = config
            .fiat_currencies
            .iter()
            .filter_map(|code| Currency::new(code).ok())
            .filter(|c| *c != quote)
            .collect();

        Ok(Self {
            client: http_client(config.request_timeout())?,
            url: config.exchangerate_api_url.trim_end_matches('/').to_string(),
            api_key: config.exchangerate_api_key.clone(),
            quote,
            currencies,
            timeout: config.request_timeout(),
        })
    }

    fn parse_quotes(&self, reply: &JsonReply) -> Result<ProviderRates, ProviderError> {
        let response: LatestRatesResponse = serde_json::from_value(reply.body.clone())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if response.result != "success" {
            return Err(ProviderError::Rejected(
                response.error_type.unwrap_or(response.result),
            ));
        }

        let conversion_rates = response.conversion_rates.ok_or_else(|| {
            ProviderError::InvalidResponse("missing conversion_rates".to_string())
        })?;

        let mut rates = ProviderRates::new();
        for code in &self.currencies {
            let Some(&raw_rate) = conversion_rates.get(code.code()) else {
                debug!(currency = %code, "Currency absent from response");
                continue;
            };

            let inverted = 1.0 / raw_rate;
            let rate = if inverted.is_finite() {
                inverted
            } else {
                warn!(currency = %code, raw_rate, "Provider reported an unusable rate");
                0.0
            };

            let mut meta = Meta::new();
            meta.insert("raw_rate".to_string(), json!(raw_rate));
            meta.insert("request_ms".to_string(), json!(reply.request_ms));
            meta.insert("status_code".to_string(), json!(reply.status));
            meta.insert(
                "time_last_update_utc".to_string(),
                json!(response.time_last_update_utc.clone().unwrap_or_default()),
            );

            let pair = CurrencyPair::new(code.clone(), self.quote.clone());
            rates.insert(pair.key(), ProviderQuote::new(rate, meta));
        }

        Ok(rates)
    }
}

#[async_trait]
impl RateProvider for FiatProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_rates(&self) -> Result<ProviderRates, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential("EXCHANGERATE_API_KEY"))?;

        let url = format!("{}/{}/latest/{}", self.url, api_key, self.quote);
        let reply = send_json(self.client.get(&url), self.timeout).await?;

        debug!(
            provider = PROVIDER_NAME,
            status = reply.status,
            request_ms = reply.request_ms,
            "Received FX rates"
        );

        self.parse_quotes(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_server;
    use serde_json::Value;

    fn provider_with(url: &str, api_key: Option<&str>) -> FiatProvider {
        let config = SyncConfig {
            exchangerate_api_url: url.to_string(),
            exchangerate_api_key: api_key.map(String::from),
            fiat_currencies: vec!["EUR".into(), "GBP".into(), "JPY".into(), "USD".into()],
            ..Default::default()
        };
        FiatProvider::new(&config).unwrap()
    }

    fn reply(body: Value) -> JsonReply {
        JsonReply {
            status: 200,
            request_ms: 40.0,
            etag: None,
            body,
        }
    }

    #[test]
    fn test_parse_inverts_rates() {
        let provider = provider_with("http://unused", Some("key"));
        let rates = provider
            .parse_quotes(&reply(json!({
                "result": "success",
                "time_last_update_utc": "Fri, 10 May 2024 00:00:01 +0000",
                "conversion_rates": {"USD": 1.0, "EUR": 0.8, "GBP": 0.0}
            })))
            .unwrap();

        assert_eq!(rates.len(), 2);
        assert!((rates["EUR_USD"].rate - 1.25).abs() < 1e-12);
        assert_eq!(rates["EUR_USD"].meta["raw_rate"], 0.8);
        assert_eq!(
            rates["EUR_USD"].meta["time_last_update_utc"],
            "Fri, 10 May 2024 00:00:01 +0000"
        );
        assert_eq!(rates["GBP_USD"].rate, 0.0);
        assert!(!rates.contains_key("JPY_USD"));
        assert!(!rates.contains_key("USD_USD"));
    }

    #[test]
    fn test_parse_maps_subnormal_rate_to_zero() {
        let provider = provider_with("http://unused", Some("key"));
        let rates = provider
            .parse_quotes(&reply(json!({
                "result": "success",
                "conversion_rates": {"EUR": 1e-309, "GBP": 0.5}
            })))
            .unwrap();

        assert_eq!(rates["EUR_USD"].rate, 0.0);
        assert_eq!(rates["GBP_USD"].rate, 2.0);

        // The whole snapshot still serializes to valid, loadable JSON.
        let encoded = serde_json::to_string(&rates["EUR_USD"].rate).unwrap();
        assert_eq!(encoded, "0.0");
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_api_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let provider = provider_with(&format!("http://{}", addr), Some("SUPERSECRETKEY"));

        let err = provider.fetch_rates().await.unwrap_err();

        assert!(matches!(err, ProviderError::Network(_)));
        assert!(!err.to_string().contains("SUPERSECRETKEY"));
    }

    #[test]
    fn test_parse_rejects_unsuccessful_result() {
        let provider = provider_with("http://unused", Some("key"));
        let result = provider.parse_quotes(&reply(json!({
            "result": "error",
            "error-type": "invalid-key"
        })));

        match result {
            Err(ProviderError::Rejected(reason)) => assert_eq!(reason, "invalid-key"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_requires_conversion_rates() {
        let provider = provider_with("http://unused", Some("key"));
        let result = provider.parse_quotes(&reply(json!({"result": "success"})));
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_request() {
        let provider = provider_with("http://127.0.0.1:9", None);
        let result = provider.fetch_rates().await;
        assert!(matches!(result, Err(ProviderError::MissingCredential(_))));
    }

    #[tokio::test]
    async fn test_fetch_rates_over_http() {
        let url = test_server::serve(
            200,
            r#"{"result":"success","conversion_rates":{"USD":1,"EUR":0.5,"GBP":0.25}}"#,
        )
        .await;
        let provider = provider_with(&format!("{}/", url), Some("key"));

        let rates = provider.fetch_rates().await.unwrap();

        assert_eq!(rates["EUR_USD"].rate, 2.0);
        assert_eq!(rates["GBP_USD"].rate, 4.0);
        assert_eq!(rates["GBP_USD"].meta["status_code"], 200);
    }

    #[tokio::test]
    async fn test_fetch_rates_fails_on_invalid_json() {
        let url = test_server::serve(200, "<html>maintenance</html>").await;
        let provider = provider_with(&url, Some("key"));

        let result = provider.fetch_rates().await;

        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
