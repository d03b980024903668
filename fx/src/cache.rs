//! Read-side views over a cached snapshot.
//!
//! Nothing here touches the network or the disk: the engine decides which
//! snapshot to read (refreshing first if it is stale) and hands it to
//! [`RateCache`].

use ratekeeper_common::{
    Currency, CurrencyKind, CurrencyPair, CurrencyRegistry, RateEntry, Snapshot, Timestamp,
    PAIR_KEY_SEPARATOR,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::LookupError;

/// All rates quoted in one currency, keyed by base currency code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateTable {
    pub rates: BTreeMap<String, f64>,
    /// Update time of each returned pair, in key order.
    pub updated_at: Vec<Timestamp>,
}

impl RateTable {
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// A single-pair answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
    pub reverse_rate: f64,
    pub updated_at: Timestamp,
}

/// What to include in a rate listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only this currency.
    pub currency: Option<Currency>,
    /// Only the N most valuable crypto currencies.
    pub top: Option<usize>,
    /// Express rates against this currency instead of the quote currency.
    pub base: Option<Currency>,
}

/// One row of a listing: `CODE_BASE` and its re-based rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedRate {
    pub pair: String,
    pub rate: f64,
}

/// Result of a rate listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateListing {
    pub base: Currency,
    pub last_refresh: Option<Timestamp>,
    pub rows: Vec<ListedRate>,
}

/// Pure reader over one snapshot.
#[derive(Debug, Clone)]
pub struct RateCache {
    snapshot: Snapshot,
}

impl RateCache {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Pairs ending in `_<quote>`, with that suffix stripped.
    pub fn rates_quoted_in(&self, quote: &Currency) -> RateTable {
        let suffix = format!("{}{}", PAIR_KEY_SEPARATOR, quote.code());
        let mut table = RateTable::default();

        for (key, entry) in &self.snapshot.pairs {
            if let Some(base) = key.strip_suffix(&suffix) {
                if base.is_empty() {
                    continue;
                }
                table.rates.insert(base.to_string(), entry.rate);
                table.updated_at.push(entry.updated_at);
            }
        }

        table
    }

    /// Look up `from -> to`. The stored pair is used directly; if only the
    /// inverse pair is stored, its rate is inverted.
    pub fn quote(&self, from: &Currency, to: &Currency) -> Result<RateQuote, LookupError> {
        if self.snapshot.is_empty() {
            return Err(LookupError::NoData);
        }

        let pair = CurrencyPair::new(from.clone(), to.clone());
        let (rate, updated_at) = if let Some(entry) = self.snapshot.get(&pair) {
            (usable_rate(&pair, entry)?, entry.updated_at)
        } else if let Some(entry) = self.snapshot.get(&pair.inverse()) {
            (1.0 / usable_rate(&pair, entry)?, entry.updated_at)
        } else {
            return Err(LookupError::PairNotTracked(pair));
        };

        Ok(RateQuote {
            from: from.clone(),
            to: to.clone(),
            rate,
            reverse_rate: 1.0 / rate,
            updated_at,
        })
    }

    /// Listing of cached rates (quoted in `quote`) re-expressed against
    /// `query.base`.
    ///
    /// A single currency takes precedence over `top`; with neither, every
    /// pair quoted in `quote` is listed in key order.
    pub fn list(
        &self,
        query: &ListQuery,
        quote: &Currency,
        registry: &CurrencyRegistry,
    ) -> Result<RateListing, LookupError> {
        if self.snapshot.is_empty() {
            return Err(LookupError::NoData);
        }

        let base = query.base.clone().unwrap_or_else(|| quote.clone());
        let divisor = if base == *quote {
            1.0
        } else {
            let pair = CurrencyPair::new(base.clone(), quote.clone());
            let entry = self
                .snapshot
                .get(&pair)
                .ok_or_else(|| LookupError::PairNotTracked(pair.clone()))?;
            usable_rate(&pair, entry)?
        };

        let quoted = self.rates_quoted_in(quote);
        let row = |code: &str, rate: f64| ListedRate {
            pair: format!("{}{}{}", code, PAIR_KEY_SEPARATOR, base),
            rate: rate / divisor,
        };

        let rows = if let Some(currency) = &query.currency {
            let pair = CurrencyPair::new(currency.clone(), quote.clone());
            let entry = self
                .snapshot
                .get(&pair)
                .ok_or_else(|| LookupError::PairNotTracked(pair.clone()))?;
            vec![row(currency.code(), usable_rate(&pair, entry)?)]
        } else if let Some(n) = query.top.filter(|n| *n > 0) {
            let mut crypto: Vec<(&String, f64)> = quoted
                .rates
                .iter()
                .filter(|(code, _)| {
                    registry
                        .resolve(code)
                        .is_some_and(|(_, kind)| kind == CurrencyKind::Crypto)
                })
                .map(|(code, rate)| (code, *rate))
                .collect();
            crypto.sort_by(|a, b| b.1.total_cmp(&a.1));
            crypto
                .into_iter()
                .take(n)
                .map(|(code, rate)| row(code, rate))
                .collect()
        } else {
            quoted
                .rates
                .iter()
                .map(|(code, rate)| row(code, *rate))
                .collect()
        };

        Ok(RateListing {
            base,
            last_refresh: self.snapshot.last_refresh,
            rows,
        })
    }
}

/// A rate that can be divided by: strictly positive and finite.
fn usable_rate(pair: &CurrencyPair, entry: &RateEntry) -> Result<f64, LookupError> {
    if entry.rate > 0.0 && entry.rate.is_finite() {
        Ok(entry.rate)
    } else {
        Err(LookupError::ZeroRate(pair.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn c(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn cache(pairs: &[(&str, f64)]) -> RateCache {
        let pairs = pairs
            .iter()
            .map(|(key, rate)| {
                (
                    key.to_string(),
                    RateEntry {
                        rate: *rate,
                        updated_at: at(12),
                        source: "test".to_string(),
                    },
                )
            })
            .collect();
        RateCache::new(Snapshot::new(pairs, at(12)))
    }

    fn registry() -> CurrencyRegistry {
        CurrencyRegistry::new()
            .with(c("USD"), CurrencyKind::Fiat)
            .with(c("EUR"), CurrencyKind::Fiat)
            .with(c("BTC"), CurrencyKind::Crypto)
            .with(c("ETH"), CurrencyKind::Crypto)
            .with(c("SOL"), CurrencyKind::Crypto)
    }

    #[test]
    fn test_rates_quoted_in_strips_suffix() {
        let cache = cache(&[("BTC_USD", 60000.0), ("EUR_USD", 1.1), ("BTC_EUR", 55000.0)]);

        let table = cache.rates_quoted_in(&c("USD"));

        assert_eq!(table.rates.len(), 2);
        assert_eq!(table.rates["BTC"], 60000.0);
        assert_eq!(table.rates["EUR"], 1.1);
        assert_eq!(table.updated_at, vec![at(12), at(12)]);
    }

    #[test]
    fn test_rates_quoted_in_empty_snapshot() {
        let cache = RateCache::new(Snapshot::default());
        assert!(cache.rates_quoted_in(&c("USD")).is_empty());
    }

    #[test]
    fn test_quote_direct_pair() {
        let cache = cache(&[("EUR_USD", 1.25)]);

        let quote = cache.quote(&c("EUR"), &c("USD")).unwrap();

        assert_eq!(quote.rate, 1.25);
        assert!((quote.reverse_rate - 0.8).abs() < 1e-12);
        assert_eq!(quote.updated_at, at(12));
    }

    #[test]
    fn test_quote_inverse_pair() {
        let cache = cache(&[("EUR_USD", 1.25)]);

        let quote = cache.quote(&c("USD"), &c("EUR")).unwrap();

        assert!((quote.rate - 0.8).abs() < 1e-12);
        assert!((quote.reverse_rate - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_quote_zero_rate_is_unavailable() {
        let cache = cache(&[("GBP_USD", 0.0)]);

        let direct = cache.quote(&c("GBP"), &c("USD"));
        let inverse = cache.quote(&c("USD"), &c("GBP"));

        assert!(matches!(direct, Err(LookupError::ZeroRate(_))));
        assert!(matches!(inverse, Err(LookupError::ZeroRate(_))));
    }

    #[test]
    fn test_quote_untracked_vs_no_data() {
        let tracked = cache(&[("EUR_USD", 1.1)]);
        let empty = RateCache::new(Snapshot::default());

        assert_eq!(
            tracked.quote(&c("JPY"), &c("USD")),
            Err(LookupError::PairNotTracked(CurrencyPair::new(c("JPY"), c("USD"))))
        );
        assert_eq!(empty.quote(&c("JPY"), &c("USD")), Err(LookupError::NoData));
    }

    #[test]
    fn test_list_all_rebased() {
        let cache = cache(&[("BTC_USD", 60000.0), ("EUR_USD", 1.2), ("ETH_USD", 3000.0)]);
        let query = ListQuery {
            base: Some(c("EUR")),
            ..Default::default()
        };

        let listing = cache.list(&query, &c("USD"), &registry()).unwrap();

        assert_eq!(listing.base, c("EUR"));
        assert_eq!(listing.last_refresh, Some(at(12)));
        let pairs: Vec<&str> = listing.rows.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC_EUR", "ETH_EUR", "EUR_EUR"]);
        assert!((listing.rows[0].rate - 50000.0).abs() < 1e-9);
        assert!((listing.rows[2].rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_list_single_currency() {
        let cache = cache(&[("BTC_USD", 60000.0), ("EUR_USD", 1.2)]);
        let query = ListQuery {
            currency: Some(c("BTC")),
            top: Some(1),
            ..Default::default()
        };

        let listing = cache.list(&query, &c("USD"), &registry()).unwrap();

        assert_eq!(
            listing.rows,
            vec![ListedRate {
                pair: "BTC_USD".to_string(),
                rate: 60000.0
            }]
        );
    }

    #[test]
    fn test_list_single_currency_missing_or_zero() {
        let cache = cache(&[("BTC_USD", 60000.0), ("SOL_USD", 0.0)]);
        let missing = ListQuery {
            currency: Some(c("ETH")),
            ..Default::default()
        };
        let zero = ListQuery {
            currency: Some(c("SOL")),
            ..Default::default()
        };

        assert!(matches!(
            cache.list(&missing, &c("USD"), &registry()),
            Err(LookupError::PairNotTracked(_))
        ));
        assert!(matches!(
            cache.list(&zero, &c("USD"), &registry()),
            Err(LookupError::ZeroRate(_))
        ));
    }

    #[test]
    fn test_list_top_crypto_descending() {
        let cache = cache(&[
            ("BTC_USD", 60000.0),
            ("ETH_USD", 3000.0),
            ("SOL_USD", 150.0),
            ("EUR_USD", 1.1),
        ]);
        let query = ListQuery {
            top: Some(2),
            ..Default::default()
        };

        let listing = cache.list(&query, &c("USD"), &registry()).unwrap();

        let pairs: Vec<&str> = listing.rows.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC_USD", "ETH_USD"]);
    }

    #[test]
    fn test_list_requires_rebase_pair() {
        let cache = cache(&[("BTC_USD", 60000.0)]);
        let query = ListQuery {
            base: Some(c("EUR")),
            ..Default::default()
        };

        assert!(matches!(
            cache.list(&query, &c("USD"), &registry()),
            Err(LookupError::PairNotTracked(_))
        ));
    }

    #[test]
    fn test_list_empty_snapshot_is_no_data() {
        let cache = RateCache::new(Snapshot::default());
        assert_eq!(
            cache.list(&ListQuery::default(), &c("USD"), &registry()),
            Err(LookupError::NoData)
        );
    }
}
