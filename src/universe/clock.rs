//! Wall-clock stamps for artifacts and run ids.

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    iso(Utc::now())
}

/// `<prefix>_YYYYMMDDHHMMSS`.
pub fn run_id(prefix: &str, ts: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, ts.format("%Y%m%d%H%M%S"))
}
