pub mod consultation;
pub mod history;
pub mod medication;

pub use consultation::*;
pub use history::*;
pub use medication::*;

use chrono::{DateTime, Utc};

/// Epoch milliseconds as stored in SQLite.
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]. `None` when the value is outside chrono's range.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Current time truncated to millisecond precision, so drafts survive a
/// database round trip unchanged.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    from_millis(to_millis(&now)).unwrap_or(now)
}
