//! Display helpers: body previews and WIB timestamps.

use chrono::{DateTime, FixedOffset, Utc};

/// Characters of body shown in the console log.
pub const CONSOLE_PREVIEW_CHARS: usize = 100;

/// Characters of body included in a notification report.
pub const REPORT_PREVIEW_CHARS: usize = 500;

/// Display zone offset (UTC+7, WIB).
const DISPLAY_OFFSET_SECS: i32 = 7 * 3600;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S WIB";

/// First `max_chars` characters of `body`, with a literal `...` appended
/// when anything was cut. Bodies at or under the limit are unchanged.
pub fn preview(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

fn display_zone() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_OFFSET_SECS).expect("UTC+7 is within offset range")
}

/// Parse a received-date header (RFC 2822 or RFC 3339).
pub fn parse_received(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Received time rendered in the display zone, or the raw string when it
/// cannot be parsed.
pub fn display_received(raw: &str) -> String {
    match parse_received(raw) {
        Some(dt) => dt.with_timezone(&display_zone()).format(DISPLAY_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// A UTC instant rendered in the display zone.
pub fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&display_zone()).format(DISPLAY_FORMAT).to_string()
}
