//! Ratekeeper Common Types
//!
//! This crate contains shared types used across Ratekeeper, including
//! currency codes, pair keys, the cached rate table and the history ledger
//! records, plus the clock abstraction every time-sensitive component uses.

pub mod error;
pub mod monetary;
pub mod rates;
pub mod time;

pub use error::*;
pub use monetary::*;
pub use rates::*;
pub use time::*;
