//! Staleness policy for the cached snapshot.

use chrono::Duration;
use ratekeeper_common::{Clock, Snapshot};
use std::sync::Arc;

/// Decides whether a snapshot is young enough to answer a query.
#[derive(Clone)]
pub struct FreshnessGate {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FreshnessGate {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock }
    }

    /// Age of the snapshot, or `None` if it has never been refreshed.
    pub fn age(&self, snapshot: &Snapshot) -> Option<Duration> {
        snapshot.age(self.clock.now())
    }

    /// A missing snapshot, or one with no refresh time, is always stale.
    /// Otherwise stale once its age strictly exceeds the TTL.
    pub fn is_stale(&self, snapshot: Option<&Snapshot>) -> bool {
        match snapshot.and_then(|s| self.age(s)) {
            Some(age) => age > self.ttl,
            None => true,
        }
    }
}

impl std::fmt::Debug for FreshnessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessGate")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
