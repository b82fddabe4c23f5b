use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use std::fmt::{Display, Write as _};

pub const INVALID_DATE: &str = "Invalid Date";

/// Layout of `toLocaleString('id-ID')`, e.g. `19/10/2026, 14.05.33`.
pub const DEFAULT_TIME_FORMAT: &str = "%d/%m/%Y, %H.%M.%S";

const LENIENT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a body `data` field into text.
///
/// Gmail hands out base64url, but senders and older exports mix in the
/// standard alphabet, padded or not. Both alphabets are accepted, padding and
/// any character outside the alphabet are skipped, and invalid UTF-8 becomes
/// U+FFFD. Never fails.
pub fn decode_body_data(data: &str) -> String {
    let mut cleaned: String = data
        .chars()
        .filter_map(|c| match c {
            '-' => Some('+'),
            '_' => Some('/'),
            'A'..='Z' | 'a'..='z' | '0'..='9' | '+' | '/' => Some(c),
            _ => None,
        })
        .collect();

    // a lone trailing sextet carries no full byte
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }

    let bytes = LENIENT_B64.decode(cleaned.as_bytes()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Format a Gmail `internalDate` (epoch millis as a decimal string).
///
/// Uses `offset` when given, the server's local zone otherwise.
pub fn format_internal_date(raw: Option<&str>, offset: Option<FixedOffset>, pattern: &str) -> String {
    let Some(utc) = raw
        .and_then(|r| r.trim().parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    else {
        return INVALID_DATE.to_string();
    };

    match offset {
        Some(off) => render(&utc.with_timezone(&off), pattern),
        None => render(&utc.with_timezone(&Local), pattern),
    }
}

fn render<Tz>(at: &DateTime<Tz>, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    // a bad pattern surfaces as fmt::Error instead of a panic
    if write!(out, "{}", at.format(pattern)).is_err() {
        return at.to_rfc3339();
    }
    out
}
