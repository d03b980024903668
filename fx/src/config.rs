//! Rate engine configuration.
//!
//! One [`SyncConfig`] is built at process start and handed to every component.
//! Layering, later wins: built-in defaults, an optional JSON file, then
//! environment variables.

use ratekeeper_common::{constants, Currency, CurrencyKind, CurrencyRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{FxError, FxResult};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "RATEKEEPER_CONFIG";

/// Longest accepted rates TTL (one year).
pub const MAX_RATES_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A config file problem found by [`SyncConfig::load`].
///
/// Loading happens before logging is set up, so these are returned to the
/// caller to log once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The named file does not exist; defaults were used.
    NotFound(PathBuf),
    /// The file could not be read or parsed; defaults were used.
    Ignored { path: PathBuf, reason: String },
}

impl ConfigWarning {
    pub fn log(&self) {
        match self {
            ConfigWarning::NotFound(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults")
            }
            ConfigWarning::Ignored { path, reason } => {
                warn!(path = %path.display(), error = %reason, "Ignoring config file")
            }
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Main rate engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding the snapshot and history files.
    pub data_directory: PathBuf,
    /// Snapshot file name inside `data_directory`.
    pub rates_file: String,
    /// History ledger file name inside `data_directory`.
    pub history_file: String,
    /// Maximum snapshot age before a read forces a refresh.
    pub rates_ttl_seconds: u64,
    /// Quote currency every stored rate is expressed in.
    pub default_base_currency: String,
    /// Per-provider request timeout.
    pub request_timeout_secs: u64,
    /// Fiat codes requested from the FX provider.
    pub fiat_currencies: Vec<String>,
    /// Crypto codes requested from the market-data provider.
    pub crypto_currencies: Vec<String>,
    /// Crypto code to market-data asset id.
    pub crypto_id_map: BTreeMap<String, String>,
    pub coingecko_url: String,
    pub exchangerate_api_url: String,
    #[serde(skip_serializing)]
    pub exchangerate_api_key: Option<String>,
    /// Background refresh interval.
    pub refresh_interval_secs: u64,
    /// Delay after a failed background refresh.
    pub error_backoff_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let crypto_id_map = [("BTC", "bitcoin"), ("ETH", "ethereum"), ("SOL", "solana")]
            .into_iter()
            .map(|(code, id)| (code.to_string(), id.to_string()))
            .collect();

        Self {
            data_directory: PathBuf::from("data"),
            rates_file: "rates.json".to_string(),
            history_file: "exchange_rates.json".to_string(),
            rates_ttl_seconds: constants::default_rates_ttl().num_seconds() as u64,
            default_base_currency: "USD".to_string(),
            request_timeout_secs: constants::default_request_timeout().num_seconds() as u64,
            fiat_currencies: ["EUR", "GBP", "RUB", "JPY", "CNY"]
                .into_iter()
                .map(String::from)
                .collect(),
            crypto_currencies: ["BTC", "ETH", "SOL"].into_iter().map(String::from).collect(),
            crypto_id_map,
            coingecko_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            exchangerate_api_url: "https://v6.exchangerate-api.com/v6".to_string(),
            exchangerate_api_key: None,
            refresh_interval_secs: constants::default_refresh_interval().num_seconds() as u64,
            error_backoff_secs: constants::refresh_error_backoff().num_seconds() as u64,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

fn lookup_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl SyncConfig {
    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Read a JSON config file. Keys absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> FxResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| FxError::persistence(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| FxError::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Defaults, then the file at `path` (or `$RATEKEEPER_CONFIG`), then the environment.
    ///
    /// An unreadable or malformed file is skipped and reported in the returned
    /// warnings.
    pub fn load(path: Option<&Path>) -> (Self, Vec<ConfigWarning>) {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let (mut config, warnings) = Self::load_file(path);
        config.apply_env(|name| std::env::var(name).ok());
        (config, warnings)
    }

    fn load_file(path: Option<PathBuf>) -> (Self, Vec<ConfigWarning>) {
        match path {
            Some(path) if path.exists() => match Self::from_file(&path) {
                Ok(config) => (config, Vec::new()),
                Err(e) => (
                    Self::default(),
                    vec![ConfigWarning::Ignored {
                        path,
                        reason: e.to_string(),
                    }],
                ),
            },
            Some(path) => (Self::default(), vec![ConfigWarning::NotFound(path)]),
            None => (Self::default(), Vec::new()),
        }
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup_trimmed(&lookup, "RATEKEEPER_DATA_DIR") {
            self.data_directory = PathBuf::from(dir);
        }

        if let Some(ttl) = lookup_trimmed(&lookup, "RATEKEEPER_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                self.rates_ttl_seconds = ttl;
            }
        }

        if let Some(base) = lookup_trimmed(&lookup, "RATEKEEPER_BASE_CURRENCY") {
            self.default_base_currency = base.to_uppercase();
        }

        if let Some(timeout) = lookup_trimmed(&lookup, "RATEKEEPER_REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse() {
                self.request_timeout_secs = timeout;
            }
        }

        if let Some(key) = lookup_trimmed(&lookup, "EXCHANGERATE_API_KEY") {
            self.exchangerate_api_key = Some(key);
        }

        if let Some(level) = lookup_trimmed(&lookup, "RATEKEEPER_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(format) = lookup_trimmed(&lookup, "RATEKEEPER_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "json" => self.log_format = LogFormat::Json,
                "text" => self.log_format = LogFormat::Text,
                _ => {}
            }
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.rates_ttl_seconds == 0 {
            return Err(FxError::Configuration("Rates TTL cannot be 0".to_string()));
        }

        if self.rates_ttl_seconds > MAX_RATES_TTL_SECS {
            return Err(FxError::Configuration(format!(
                "Rates TTL cannot exceed {} seconds",
                MAX_RATES_TTL_SECS
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(FxError::Configuration(
                "Request timeout cannot be 0".to_string(),
            ));
        }

        if self.refresh_interval_secs == 0 {
            return Err(FxError::Configuration(
                "Refresh interval cannot be 0".to_string(),
            ));
        }

        self.base_currency()?;

        for code in self.fiat_currencies.iter().chain(&self.crypto_currencies) {
            Currency::new(code).map_err(|e| FxError::Configuration(e.to_string()))?;
        }

        if let Some(code) = self
            .crypto_currencies
            .iter()
            .find(|code| !self.crypto_id_map.contains_key(code.to_uppercase().as_str()))
        {
            return Err(FxError::Configuration(format!(
                "No asset id mapped for crypto currency {}",
                code
            )));
        }

        Ok(())
    }

    /// The quote currency all rates are stored against.
    pub fn base_currency(&self) -> FxResult<Currency> {
        Currency::new(&self.default_base_currency)
            .map_err(|e| FxError::Configuration(format!("Base currency: {}", e)))
    }

    pub fn rates_path(&self) -> PathBuf {
        self.data_directory.join(&self.rates_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_directory.join(&self.history_file)
    }

    /// Clamped to [`MAX_RATES_TTL_SECS`].
    pub fn rates_ttl(&self) -> chrono::Duration {
        let secs = self.rates_ttl_seconds.min(MAX_RATES_TTL_SECS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(365))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Known currencies: the base currency plus every configured fiat and crypto code.
    pub fn registry(&self) -> CurrencyRegistry {
        let mut registry = CurrencyRegistry::new();
        if let Ok(base) = self.base_currency() {
            registry.register(base, CurrencyKind::Fiat);
        }
        for code in &self.fiat_currencies {
            if let Ok(c) = Currency::new(code) {
                registry.register(c, CurrencyKind::Fiat);
            }
        }
        for code in &self.crypto_currencies {
            if let Ok(c) = Currency::new(code) {
                registry.register(c, CurrencyKind::Crypto);
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rates_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.rates_path(), PathBuf::from("data/rates.json"));
        assert_eq!(config.history_path(), PathBuf::from("data/exchange_rates.json"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = SyncConfig::default();
        config.rates_ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.default_base_currency = "dollars".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.crypto_currencies.push("DOGE".to_string());
        assert!(matches!(config.validate(), Err(FxError::Configuration(_))));
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        let vars: HashMap<&str, &str> =
            [("RATEKEEPER_TTL_SECONDS", "18446744073709551615")].into_iter().collect();
        let mut config = SyncConfig::default();
        config.apply_env(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.rates_ttl_seconds, u64::MAX);
        assert!(matches!(config.validate(), Err(FxError::Configuration(_))));
        assert_eq!(config.rates_ttl(), chrono::Duration::days(365));

        config.rates_ttl_seconds = 10_000_000_000_000_000;
        assert!(config.validate().is_err());
        assert!(config.rates_ttl() > chrono::Duration::zero());

        config.rates_ttl_seconds = MAX_RATES_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.json");

        let (config, warnings) = SyncConfig::load_file(Some(path.clone()));

        assert_eq!(config.rates_ttl_seconds, 300);
        assert_eq!(warnings, vec![ConfigWarning::NotFound(path)]);
    }

    #[test]
    fn test_load_reports_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (config, warnings) = SyncConfig::load_file(Some(path.clone()));

        assert_eq!(config.default_base_currency, "USD");
        assert!(matches!(
            warnings.as_slice(),
            [ConfigWarning::Ignored { path: p, .. }] if *p == path
        ));
    }

    #[test]
    fn test_load_without_file_has_no_warnings() {
        let (_, warnings) = SyncConfig::load_file(None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RATEKEEPER_DATA_DIR", "/var/lib/ratekeeper"),
            ("RATEKEEPER_TTL_SECONDS", "60"),
            ("RATEKEEPER_BASE_CURRENCY", "eur"),
            ("EXCHANGERATE_API_KEY", "  secret  "),
            ("RATEKEEPER_LOG_FORMAT", "JSON"),
            ("RATEKEEPER_REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_env(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.data_directory, PathBuf::from("/var/lib/ratekeeper"));
        assert_eq!(config.rates_ttl_seconds, 60);
        assert_eq!(config.default_base_currency, "EUR");
        assert_eq!(config.exchangerate_api_key.as_deref(), Some("secret"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"rates_ttl_seconds": 120, "log_format": "json"}"#).unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.rates_ttl_seconds, 120);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_base_currency, "USD");
        assert_eq!(config.crypto_id_map.get("BTC").map(String::as_str), Some("bitcoin"));
    }

    #[test]
    fn test_from_file_rejects_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            SyncConfig::from_file(&path),
            Err(FxError::Configuration(_))
        ));
    }

    #[test]
    fn test_registry_from_config() {
        let registry = SyncConfig::default().registry();
        assert_eq!(registry.resolve("usd").map(|(_, k)| k), Some(CurrencyKind::Fiat));
        assert_eq!(registry.resolve("BTC").map(|(_, k)| k), Some(CurrencyKind::Crypto));
        assert!(registry.resolve("XRP").is_none());
    }
}
