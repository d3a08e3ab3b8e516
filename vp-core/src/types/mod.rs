//! Slow Track ledger types

mod allocation;
mod attestation;
mod event;
mod proposal;
mod reconcile;
pub mod serde_helpers;

pub use allocation::*;
pub use attestation::*;
pub use event::*;
pub use proposal::*;
pub use reconcile::*;

use chrono::{DateTime, Utc};

/// Convert an on-chain unix timestamp (seconds) into a UTC datetime.
///
/// Values beyond chrono's range clamp to the maximum representable instant.
pub fn datetime_from_unix(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
