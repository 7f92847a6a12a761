use chrono::Duration;
use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)([dhms])").expect("valid duration pattern"))
}

/// Parses compact durations such as `3d`, `24h` or `1h30m`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let mut total_seconds = 0i64;
    let mut found = false;

    for cap in pattern().captures_iter(s) {
        found = true;
        let value: i64 = cap[1].parse().ok()?;
        let unit = &cap[2];

        let unit_seconds = match unit {
            "d" => 24 * 3600,
            "h" => 3600,
            "m" => 60,
            _ => 1,
        };
        total_seconds = total_seconds.checked_add(value.checked_mul(unit_seconds)?)?;
    }

    if found && total_seconds > 0 {
        Duration::try_seconds(total_seconds)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10m30s"), Some(Duration::seconds(630)));
        assert_eq!(parse_duration("3d"), Some(Duration::days(3)));
        assert_eq!(parse_duration("24h"), Some(Duration::hours(24)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("0s"), None);
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        assert_eq!(parse_duration("99999999999999999d"), None);
        assert_eq!(parse_duration("99999999999999999s"), None);
        assert_eq!(parse_duration("9223372036854775807s1s"), None);
        // Too many digits for i64 at all
        assert_eq!(parse_duration("99999999999999999999999s"), None);
    }
}
