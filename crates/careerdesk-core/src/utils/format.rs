use chrono::{DateTime, Duration, Utc};

/// Format the time left on a session for display.
/// Rounds down to whole minutes; anything at or below zero is "expired".
pub fn format_remaining(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "expired".to_string();
    }

    let minutes = remaining.num_minutes();
    if minutes < 1 {
        "less than a minute".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, remaining_mins)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours == 0 {
            format!("{}d", days)
        } else {
            format!("{}d {}h", days, remaining_hours)
        }
    }
}

/// Format a timestamp the way the CLI prints expiry times
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%b %d, %Y %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::seconds(-5)), "expired");
        assert_eq!(format_remaining(Duration::zero()), "expired");
        assert_eq!(format_remaining(Duration::seconds(30)), "less than a minute");
        assert_eq!(format_remaining(Duration::minutes(42)), "42m");
        assert_eq!(format_remaining(Duration::minutes(120)), "2h");
        assert_eq!(format_remaining(Duration::minutes(185)), "3h 5m");
        assert_eq!(format_remaining(Duration::days(7)), "7d");
        assert_eq!(format_remaining(Duration::hours(30)), "1d 6h");
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(format_timestamp(at), "Mar 09, 2026 14:05 UTC");
    }
}
