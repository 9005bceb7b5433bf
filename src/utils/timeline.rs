use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

/// Calendar day of an instant in the viewer's timezone.
pub fn local_day(t: DateTime<Utc>) -> NaiveDate {
    t.with_timezone(&Local).date_naive()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Separator label for a day of messages: "Today", "Yesterday", else a
/// spelled-out date.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if date == today - Duration::days(1) {
        "Yesterday".to_string()
    } else {
        date.format("%B %-d, %Y").to_string()
    }
}

/// Relative-time display for roster rows and message footers.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    if elapsed < Duration::minutes(1) {
        return "just now".to_string();
    }
    if elapsed < Duration::hours(1) {
        return plural(elapsed.num_minutes(), "minute");
    }
    if elapsed < Duration::days(1) {
        return plural(elapsed.num_hours(), "hour");
    }
    if elapsed < Duration::days(7) {
        return plural(elapsed.num_days(), "day");
    }
    local_day(then).format("%B %-d, %Y").to_string()
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_labels() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(
            day_label(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(), today),
            "Yesterday"
        );
        assert_eq!(
            day_label(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), today),
            "March 1, 2026"
        );
    }

    #[test]
    fn relative_times() {
        let now = Utc::now();
        assert_eq!(time_ago(now - Duration::seconds(20), now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(time_ago(now - Duration::minutes(12), now), "12 minutes ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2 days ago");
    }
}
