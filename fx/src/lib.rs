//! Ratekeeper FX engine
//!
//! Keeps a local cache of exchange rates in sync with upstream providers.
//!
//! # Features
//!
//! - Crypto (CoinGecko) and fiat (ExchangeRate-API) providers behind one trait
//! - Deterministic merge of provider results, last provider wins
//! - Crash-safe snapshot and deduplicated history ledger on disk
//! - TTL-gated reads that refresh the snapshot when it goes stale
//! - Periodic background refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use ratekeeper_fx::{RateEngine, SyncConfig};
//!
//! let engine = RateEngine::from_config(&SyncConfig::from_env())?;
//!
//! let quote = engine.get_rate("BTC", "USD").await?;
//! println!("{} -> {}: {}", quote.from, quote.to, quote.rate);
//! ```

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod provider;
pub mod scheduler;
pub mod store;

pub use aggregator::{RateAggregator, RunSummary};
pub use cache::{ListQuery, ListedRate, RateCache, RateListing, RateQuote, RateTable};
pub use config::{ConfigWarning, LogFormat, SyncConfig, CONFIG_PATH_ENV, MAX_RATES_TTL_SECS};
pub use engine::RateEngine;
pub use error::{FxError, FxResult, LookupError, ProviderError};
pub use freshness::FreshnessGate;
pub use provider::{build_providers, normalize_source_name, ProviderKind, RateProvider};
pub use scheduler::RateScheduler;
pub use store::RateStore;
