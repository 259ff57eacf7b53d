//! Millisecond UTC instants and their caller-facing rendering.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serializer;

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn format_ms(ms: i64) -> String {
    to_datetime(ms).format(DISPLAY_FORMAT).to_string()
}

/// Parses an absolute UTC time as sent by clients: RFC 3339, or one of the
/// naive `YYYY-MM-DD HH:MM[:SS]` / `YYYY-MM-DDTHH:MM[:SS]` forms.
pub fn parse_utc(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
    .map(|naive| naive.and_utc())
}

pub fn serialize_ms<S: Serializer>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ms(*ms))
}

pub fn serialize_opt_ms<S: Serializer>(ms: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
    match ms {
        Some(ms) => serializer.serialize_str(&format_ms(*ms)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ms() {
        let ms = Utc
            .with_ymd_and_hms(2024, 3, 5, 7, 8, 9)
            .unwrap()
            .timestamp_millis()
            + 999;
        assert_eq!(format_ms(ms), "2024-03-05 07:08:09");
    }

    #[test]
    fn test_parse_utc_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_utc("2024-06-01 09:30"), Some(expected));
        assert_eq!(parse_utc("2024-06-01 09:30:00"), Some(expected));
        assert_eq!(parse_utc("2024-06-01T09:30"), Some(expected));
        assert_eq!(parse_utc("2024-06-01T11:30:00+02:00"), Some(expected));
        assert_eq!(parse_utc("2024-06-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_utc("tomorrow"), None);
        assert_eq!(parse_utc("09:30"), None);
    }
}
