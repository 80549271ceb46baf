//! # Temporal Type Conversion Module
//!
//! Helpers that turn chrono values into the text stored in a [`Value`](crate::Value)
//! and parse such text back. Every dialect accepts the same ISO-8601 shapes,
//! so bindings stay driver agnostic.
//!
//! ## Supported Types
//!
//! - `DateTime<Utc>` - `YYYY-MM-DD HH:MM:SS[.ffffff]` in UTC
//! - `NaiveDateTime` - `YYYY-MM-DD HH:MM:SS[.ffffff]`
//! - `NaiveDate` - `YYYY-MM-DD`
//! - `NaiveTime` - `HH:MM:SS[.ffffff]`

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::Error;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

// ============================================================================
// Formatting
// ============================================================================

/// Formats a UTC timestamp for binding.
///
/// The offset is dropped: MySQL `DATETIME` rejects it and SQLite compares
/// timestamps lexically, so the stored text must share one shape.
pub fn format_datetime_utc(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub fn format_naive_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub fn format_naive_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn format_naive_time(value: &NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a UTC timestamp, accepting RFC 3339 as well as the bare
/// `YYYY-MM-DD HH:MM:SS` form produced by [`format_datetime_utc`].
pub fn parse_datetime_utc(value: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    parse_naive_datetime(value)
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::Conversion(format!("Failed to parse DateTime<Utc>: {}", value)))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime, Error> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| value.parse::<NaiveDateTime>())
        .map_err(|e| Error::Conversion(format!("Failed to parse NaiveDateTime: {}", e)))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate, Error> {
    // Timestamps stored in a DATE-typed SQLite column still carry the time part.
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|e| Error::Conversion(format!("Failed to parse NaiveDate: {}", e)))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| value.parse::<NaiveTime>())
        .map_err(|e| Error::Conversion(format!("Failed to parse NaiveTime: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_round_trips_through_text() {
        let value = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let text = format_datetime_utc(&value);
        assert_eq!(text, "2024-01-15 14:30:00");
        assert_eq!(parse_datetime_utc(&text).unwrap(), value);
    }

    #[test]
    fn rfc3339_is_accepted() {
        let parsed = parse_datetime_utc("2024-01-15T14:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap());
    }

    #[test]
    fn date_ignores_trailing_time() {
        let parsed = parse_naive_date("2024-03-09 10:00:00").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn garbage_is_a_conversion_error() {
        assert!(matches!(parse_naive_time("noon"), Err(Error::Conversion(_))));
    }
}
