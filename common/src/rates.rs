//! Cached rate table and history ledger records.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::monetary::{Currency, CurrencyPair};
use crate::time::{format_timestamp, iso_seconds, Timestamp};

/// Free-form provider diagnostics attached to a quote.
pub type Meta = Map<String, Value>;

/// One currency pair's current quote. The pair itself is the snapshot key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    /// Quote currency per unit of base currency.
    pub rate: f64,
    /// Timestamp of the run that produced this value.
    #[serde(with = "iso_seconds")]
    pub updated_at: Timestamp,
    /// Provider that supplied the value.
    pub source: String,
}

/// The full cached rate table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Pair key to entry.
    #[serde(default)]
    pub pairs: BTreeMap<String, RateEntry>,
    /// Most recent successful aggregation.
    #[serde(with = "iso_seconds::option", default)]
    pub last_refresh: Option<Timestamp>,
}

impl Snapshot {
    /// Build a snapshot from a merged rate map.
    pub fn new(pairs: BTreeMap<String, RateEntry>, last_refresh: Timestamp) -> Self {
        Self {
            pairs,
            last_refresh: Some(last_refresh),
        }
    }

    /// Get the entry for a pair.
    pub fn get(&self, pair: &CurrencyPair) -> Option<&RateEntry> {
        self.pairs.get(&pair.key())
    }

    /// Age of the snapshot at `now`; `None` if it was never refreshed.
    pub fn age(&self, now: Timestamp) -> Option<Duration> {
        self.last_refresh.map(|at| now - at)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Immutable fact: at `timestamp`, `source` reported `from_currency/to_currency = rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Deterministic identity used for deduplication.
    pub id: String,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: f64,
    #[serde(with = "iso_seconds")]
    pub timestamp: Timestamp,
    pub source: String,
    #[serde(default)]
    pub meta: Meta,
}

impl HistoryRecord {
    /// Create a record; the id is derived from the pair and timestamp.
    pub fn new(
        pair: &CurrencyPair,
        rate: f64,
        timestamp: Timestamp,
        source: impl Into<String>,
        meta: Meta,
    ) -> Self {
        Self {
            id: Self::record_id(pair, &timestamp),
            from_currency: pair.base.clone(),
            to_currency: pair.quote.clone(),
            rate,
            timestamp,
            source: source.into(),
            meta,
        }
    }

    /// `<FROM>_<TO>_<timestamp>`.
    pub fn record_id(pair: &CurrencyPair, timestamp: &Timestamp) -> String {
        format!("{}_{}", pair.key(), format_timestamp(timestamp))
    }

    /// The pair this record describes.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.from_currency.clone(), self.to_currency.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_snapshot_file_shape() {
        let mut pairs = BTreeMap::new();
        pairs.insert(
            "BTC_USD".to_string(),
            RateEntry {
                rate: 60000.0,
                updated_at: at(10, 0),
                source: "CoinGecko".to_string(),
            },
        );
        let snapshot = Snapshot::new(pairs, at(10, 0));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({
                "pairs": {
                    "BTC_USD": {
                        "rate": 60000.0,
                        "updated_at": "2024-05-10T10:00:00",
                        "source": "CoinGecko"
                    }
                },
                "last_refresh": "2024-05-10T10:00:00"
            })
        );
    }

    #[test]
    fn test_snapshot_tolerates_missing_fields() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.last_refresh.is_none());
        assert!(snapshot.age(at(10, 0)).is_none());
    }

    #[test]
    fn test_snapshot_age() {
        let snapshot = Snapshot::new(BTreeMap::new(), at(10, 0));
        assert_eq!(snapshot.age(at(10, 4)), Some(Duration::minutes(4)));
    }

    #[test]
    fn test_history_record_id() {
        let pair = CurrencyPair::from_key("ETH_USD").unwrap();
        let record = HistoryRecord::new(&pair, 3000.5, at(9, 30), "CoinGecko", Meta::new());

        assert_eq!(record.id, "ETH_USD_2024-05-10T09:30:00");
        assert_eq!(record.pair(), pair);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["from_currency"], "ETH");
        assert_eq!(value["to_currency"], "USD");
        assert_eq!(value["timestamp"], "2024-05-10T09:30:00");
        assert_eq!(value["meta"], json!({}));
    }
}
