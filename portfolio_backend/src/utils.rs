//! Shared helpers and constants.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

pub const APP_NAME: &str = "portfolio_backend";

/// Truncated to the microsecond precision timestamps are stored with, so a
/// record handed back on insert matches the one read back later.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so that lexical order of
/// stored timestamps matches chronological order.
pub fn storage_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn display_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M").to_string()
}
