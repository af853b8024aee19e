//! Duration text: `500ms`, `20s`, `2m`, `2min`, `1h`, or bare seconds.

use std::time::Duration;

/// Parse an interval. Returns `None` for text that is not a valid interval.
pub fn parse_interval(text: &str) -> Option<Duration> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "msec" => Some(Duration::from_millis(value)),
        "" | "s" | "sec" => Some(Duration::from_secs(value)),
        "m" | "min" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" | "hr" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}

/// Parse a millisecond count, treating anything invalid or negative as zero.
pub fn parse_millis(text: Option<&str>) -> Duration {
    text.and_then(|t| t.trim().parse::<i64>().ok())
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms as u64))
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_interval("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_interval("20s"), Some(Duration::from_secs(20)));
        assert_eq!(parse_interval("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_interval("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_interval("2min"), Some(Duration::from_secs(120)));
        assert_eq!(parse_interval("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("fast"), None);
        assert_eq!(parse_interval("10 parsecs"), None);
    }

    #[test]
    fn millis_are_lenient() {
        assert_eq!(parse_millis(Some("20000")), Duration::from_secs(20));
        assert_eq!(parse_millis(Some("-5")), Duration::ZERO);
        assert_eq!(parse_millis(Some("soon")), Duration::ZERO);
        assert_eq!(parse_millis(None), Duration::ZERO);
    }
}
