use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(d|M|Y)$").unwrap());

const HOURS_PER_DAY: i64 = 24;
const HOURS_PER_MONTH: i64 = HOURS_PER_DAY * 30;
const HOURS_PER_YEAR: i64 = HOURS_PER_MONTH * 12;

/// Parse `<int>d`, `<int>M` (30 days) or `<int>Y` (12 months).
///
/// Durations that cannot be added to the current time are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(input)?;
    let amount: i64 = caps[1].parse().ok()?;
    let hours = match &caps[2] {
        "d" => HOURS_PER_DAY,
        "M" => HOURS_PER_MONTH,
        _ => HOURS_PER_YEAR,
    };
    amount
        .checked_mul(hours)
        .and_then(Duration::try_hours)
        .filter(|d| Utc::now().checked_add_signed(*d).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("14d"), Some(Duration::days(14)));
        assert_eq!(parse_duration("3M"), Some(Duration::days(90)));
        assert_eq!(parse_duration("1Y"), Some(Duration::days(360)));
        assert_eq!(parse_duration("0d"), Some(Duration::zero()));
    }

    #[test]
    fn test_rejects_other_forms() {
        for input in ["", "14", "d", "14h", "2w", "1y", "1m", "-1d", " 1d", "1d ", "1.5M", "abc"] {
            assert_eq!(parse_duration(input), None, "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(parse_duration("99999999999999999999Y"), None);
        assert_eq!(parse_duration("9223372036854775807Y"), None);
    }

    #[test]
    fn test_rejects_duration_past_representable_dates() {
        assert_eq!(parse_duration("300000Y"), None);
        assert_eq!(parse_duration("200000000d"), None);
        assert_eq!(parse_duration("1000Y"), Some(Duration::days(360_000)));
    }
}
