use chrono::{DateTime, SecondsFormat, TimeZone, Timelike, Utc};

/// Time primitives
///
/// Every instant the dashboard handles is UTC-normalized.
pub type Instant = DateTime<Utc>;

/// Length of the compact URL timestamp (`yyyyMMddHHmm`).
pub const URL_TIMESTAMP_LEN: usize = 12;

/// Formats an instant as the 12-digit `yyyyMMddHHmm` UTC form used in share links.
pub fn format_url_timestamp(t: Instant) -> String {
    t.format("%Y%m%d%H%M").to_string()
}

/// Parses a 12-digit `yyyyMMddHHmm` UTC timestamp.
///
/// Anything that is not exactly twelve ASCII digits forming a valid calendar
/// minute yields `None`.
pub fn parse_url_timestamp(raw: &str) -> Option<Instant> {
    let raw = raw.trim();
    if raw.len() != URL_TIMESTAMP_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();
    let year = raw[0..4].parse::<i32>().ok()?;
    Utc.with_ymd_and_hms(
        year,
        field(4..6)?,
        field(6..8)?,
        field(8..10)?,
        field(10..12)?,
        0,
    )
    .single()
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2025-02-01T00:00:00.000Z`.
pub fn format_iso(t: Instant) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso(raw: &str) -> Option<Instant> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Rounds an instant down to the nearest 5-minute boundary (seconds cleared).
pub fn rectify_to_five_minutes(t: Instant) -> Instant {
    let minute = (t.minute() / 5) * 5;
    t.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
