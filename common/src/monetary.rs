//! Currency codes and currency pairs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Separator between base and quote in a pair key.
pub const PAIR_KEY_SEPARATOR: char = '_';

/// ISO-like currency code (fiat or crypto), always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a currency from a code, normalising case and surrounding whitespace.
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim().to_uppercase();
        let valid = (2..=5).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(CommonError::InvalidCurrencyCode(code));
        }
        Ok(Self(code))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Lowercase code, as some upstream APIs expect.
    pub fn code_lower(&self) -> String {
        self.0.to_lowercase()
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn btc() -> Self {
        Self("BTC".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CommonError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

/// Whether a currency is a fiat or a crypto asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

/// An ordered currency pair, keyed as `<BASE>_<QUOTE>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the unit being priced).
    pub base: Currency,
    /// Quote currency (pricing currency).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Parse a canonical pair key such as `BTC_USD`.
    pub fn from_key(key: &str) -> Result<Self> {
        let (base, quote) = key
            .split_once(PAIR_KEY_SEPARATOR)
            .ok_or_else(|| CommonError::InvalidPairKey(key.to_string()))?;
        let invalid = |_| CommonError::InvalidPairKey(key.to_string());
        Ok(Self {
            base: Currency::new(base).map_err(invalid)?,
            quote: Currency::new(quote).map_err(invalid)?,
        })
    }

    /// Canonical key for this pair.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.base, PAIR_KEY_SEPARATOR, self.quote)
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_KEY_SEPARATOR, self.quote)
    }
}

/// The set of currencies the system knows about.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<Currency, CurrencyKind>,
}

impl CurrencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a currency. A later registration replaces the kind.
    pub fn register(&mut self, currency: Currency, kind: CurrencyKind) {
        self.currencies.insert(currency, kind);
    }

    /// Builder-style registration.
    pub fn with(mut self, currency: Currency, kind: CurrencyKind) -> Self {
        self.register(currency, kind);
        self
    }

    /// Resolve a user-supplied code to a known currency.
    pub fn resolve(&self, code: &str) -> Option<(Currency, CurrencyKind)> {
        let currency = Currency::new(code).ok()?;
        let kind = self.kind(&currency)?;
        Some((currency, kind))
    }

    /// Kind of a known currency.
    pub fn kind(&self, currency: &Currency) -> Option<CurrencyKind> {
        self.currencies.get(currency).copied()
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.currencies.contains_key(currency)
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}
