//! Rate provider trait and the upstream clients behind it.

use async_trait::async_trait;
use ratekeeper_common::Meta;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::error::{FxError, FxResult, ProviderError};

pub mod crypto;
pub mod fiat;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use crypto::CryptoProvider;
pub use fiat::FiatProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateProvider;

/// One quote returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuote {
    /// Quote currency per unit of base currency.
    pub rate: f64,
    /// Provider diagnostics (latency, HTTP status, raw ids).
    pub meta: Meta,
}

impl ProviderQuote {
    pub fn new(rate: f64, meta: Meta) -> Self {
        Self { rate, meta }
    }
}

/// Pair key to quote, as returned by one provider call.
pub type ProviderRates = BTreeMap<String, ProviderQuote>;

/// Trait for upstream rate sources.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch every pair this provider tracks. All or nothing: on error no
    /// rates are returned.
    async fn fetch_rates(&self) -> Result<ProviderRates, ProviderError>;
}

/// The closed set of upstream clients, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Crypto,
    Fiat,
}

impl ProviderKind {
    /// Fixed iteration order. Later providers win ties on the same pair.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Crypto, ProviderKind::Fiat];

    pub fn build(self, config: &SyncConfig) -> FxResult<Arc<dyn RateProvider>> {
        Ok(match self {
            ProviderKind::Crypto => Arc::new(CryptoProvider::new(config)?),
            ProviderKind::Fiat => Arc::new(FiatProvider::new(config)?),
        })
    }
}

/// Build every configured provider in the fixed iteration order.
pub fn build_providers(config: &SyncConfig) -> FxResult<Vec<Arc<dyn RateProvider>>> {
    ProviderKind::ALL
        .iter()
        .map(|kind| kind.build(config))
        .collect()
}

/// Lowercase and strip everything but letters and digits, so that
/// `ExchangeRate-API`, `exchangerate api` and `EXCHANGERATEAPI` compare equal.
pub fn normalize_source_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn http_client(timeout: Duration) -> FxResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FxError::HttpClient(e.to_string()))
}

/// A successful upstream reply.
#[derive(Debug)]
pub(crate) struct JsonReply {
    pub status: u16,
    pub request_ms: f64,
    pub etag: Option<String>,
    pub body: Value,
}

/// Send a request and decode a JSON body, failing on any non-2xx status.
pub(crate) async fn send_json(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<JsonReply, ProviderError> {
    let started = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| classify_request_error(e, timeout))?;
    let request_ms = started.elapsed().as_secs_f64() * 1000.0;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::HttpStatus(status.as_u16()));
    }

    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let body = response
        .json::<Value>()
        .await
        .map_err(|e| classify_request_error(e, timeout))?;

    Ok(JsonReply {
        status: status.as_u16(),
        request_ms,
        etag,
        body,
    })
}

fn classify_request_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::from(e)
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Loopback HTTP server returning one canned response per connection.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `body` with `status` until the test ends; returns the base URL.
    pub async fn serve(status: u16, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {} X\r\ncontent-type: application/json\r\netag: \"v1\"\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_source_name() {
        assert_eq!(normalize_source_name("ExchangeRate-API"), "exchangerateapi");
        assert_eq!(normalize_source_name("exchangerate api"), "exchangerateapi");
        assert_eq!(normalize_source_name("Coin_Gecko"), "coingecko");
    }

    #[test]
    fn test_build_providers_order() {
        let providers = build_providers(&SyncConfig::default()).unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["CoinGecko", "ExchangeRate-API"]);
    }
}
