//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// UTC timestamp used for readings, alerts and usage records.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Start of a look-back window ending at `at`.
///
/// Windows too large for chrono saturate to the earliest representable time.
#[must_use]
pub fn window_start(at: Timestamp, window: Duration) -> Timestamp {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
