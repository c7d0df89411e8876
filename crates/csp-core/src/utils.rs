//! Utility helpers: data paths, Slack timestamp formatting, mention markers.

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Timezone used when the configured one is not a valid IANA name.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Get the data directory (e.g. `~/.csp/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".csp")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

// ─────────────────────────────────────────────
// Mentions
// ─────────────────────────────────────────────

/// The `<@U123>` marker Slack inserts when a user is mentioned.
pub fn mention_marker(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// Remove every mention of `user_id` and trim surrounding whitespace.
pub fn strip_mention(text: &str, user_id: &str) -> String {
    text.replace(&mention_marker(user_id), "").trim().to_string()
}

// ─────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────

/// Parse a Slack timestamp (`"1700000000.000100"`) into a UTC instant.
///
/// Sub-second precision is dropped; Slack uses it only for uniqueness.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = ts.split('.').next()?.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Resolve an IANA timezone name, falling back to [`DEFAULT_TIMEZONE`].
pub fn parse_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = %name, "unknown timezone, using America/New_York");
        DEFAULT_TIMEZONE
    })
}

/// Format a Slack timestamp as `2006-01-02 15:04:05 MST` in `tz`.
///
/// Unparseable input is returned unchanged.
pub fn format_slack_ts(ts: &str, tz: Tz) -> String {
    match parse_slack_ts(ts) {
        Some(instant) => instant
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        None => {
            warn!(ts = %ts, "could not parse Slack timestamp");
            ts.to_string()
        }
    }
}

/// How long ago a Slack timestamp was, relative to `now`.
pub fn age_of(ts: &str, now: DateTime<Utc>) -> Option<Duration> {
    parse_slack_ts(ts).map(|posted| now - posted)
}
