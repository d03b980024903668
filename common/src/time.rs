//! Time utilities for Ratekeeper.
//!
//! Timestamps are local wall-clock times with second precision, written as
//! `YYYY-MM-DDTHH:MM:SS` in every persisted file.

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use parking_lot::Mutex;

use crate::error::{CommonError, Result};

/// Rate timing constants.
pub mod constants {
    use super::Duration;

    /// Default snapshot freshness window (5 minutes).
    pub fn default_rates_ttl() -> Duration {
        Duration::minutes(5)
    }

    /// Default per-provider request timeout (10 seconds).
    pub fn default_request_timeout() -> Duration {
        Duration::seconds(10)
    }

    /// Default background refresh interval (1 hour).
    pub fn default_refresh_interval() -> Duration {
        Duration::hours(1)
    }

    /// Delay before retrying after a failed background refresh (1 minute).
    pub fn refresh_error_backoff() -> Duration {
        Duration::minutes(1)
    }
}

/// A local timestamp, truncated to whole seconds.
pub type Timestamp = NaiveDateTime;

/// Persisted timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a timestamp the way it is persisted.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp. A fractional-seconds suffix is tolerated and dropped.
pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .map(truncate_to_seconds)
        .map_err(|_| CommonError::InvalidTimestamp(s.to_string()))
}

/// Drop sub-second precision.
pub fn truncate_to_seconds(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Serde codec for [`Timestamp`] fields.
pub mod iso_seconds {
    use super::{format_timestamp, parse_timestamp, Timestamp};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(D::Error::custom)
    }

    /// Codec for `Option<Timestamp>` fields; `null` and absent map to `None`.
    pub mod option {
        use super::{format_timestamp, parse_timestamp, Timestamp};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<Timestamp>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Timestamp>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse_timestamp(&raw).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// Source of "now" for every time-sensitive component.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        truncate_to_seconds(Local::now().naive_local())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(truncate_to_seconds(start)),
        }
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = truncate_to_seconds(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
