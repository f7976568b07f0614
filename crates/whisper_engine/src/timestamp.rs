use chrono::{DateTime, NaiveTime, Timelike};

const HALF_DAY_SECS: i64 = 12 * 60 * 60;

/// A timestamp as far as ordering checks are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    /// Absolute instant, seconds since the epoch.
    Instant(i64),
    /// Wall-clock time of day, seconds since midnight.
    TimeOfDay(i64),
}

/// Parses the timestamp formats chat platforms commonly render.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTimestamp::Instant(instant.timestamp()));
    }
    let upper = raw.to_ascii_uppercase();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M:%S %p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&upper, fmt).ok())
        .map(|time| ParsedTimestamp::TimeOfDay(time.num_seconds_from_midnight() as i64))
}

/// True when `next` is earlier than `previous`.
///
/// Time-of-day values that drop by half a day or more are treated as a day
/// rollover rather than a violation. Mixed or unparseable pairs never violate.
pub fn is_order_violation(previous: &str, next: &str) -> bool {
    match (parse_timestamp(previous), parse_timestamp(next)) {
        (Some(ParsedTimestamp::Instant(a)), Some(ParsedTimestamp::Instant(b))) => b < a,
        (Some(ParsedTimestamp::TimeOfDay(a)), Some(ParsedTimestamp::TimeOfDay(b))) => {
            b < a && a - b < HALF_DAY_SECS
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_order_violation, parse_timestamp, ParsedTimestamp};

    #[test]
    fn parses_common_formats() {
        assert_eq!(parse_timestamp("10:05"), Some(ParsedTimestamp::TimeOfDay(36_300)));
        assert_eq!(parse_timestamp("1:05 pm"), Some(ParsedTimestamp::TimeOfDay(47_100)));
        assert!(matches!(
            parse_timestamp("2024-03-01T10:00:00Z"),
            Some(ParsedTimestamp::Instant(_))
        ));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn detects_decreasing_times_but_allows_midnight_rollover() {
        assert!(is_order_violation("10:05", "10:01"));
        assert!(!is_order_violation("10:01", "10:05"));
        assert!(!is_order_violation("23:59", "00:01"));
        assert!(!is_order_violation("", "10:01"));
    }
}
