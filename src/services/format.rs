//! Display helpers for dates and statuses

use crate::models::ReportStatus;
use chrono::{DateTime, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 12 * MONTH;

/// Relative age such as "5 minutes ago". Timestamps in the future read as
/// "just now".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < MINUTE {
        return "just now".to_string();
    }

    let (count, unit) = if seconds < HOUR {
        (seconds / MINUTE, "minute")
    } else if seconds < DAY {
        (seconds / HOUR, "hour")
    } else if seconds < MONTH {
        (seconds / DAY, "day")
    } else if seconds < YEAR {
        (seconds / MONTH, "month")
    } else {
        (seconds / YEAR, "year")
    };

    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

/// e.g. "Jan 5, 2024, 03:07 PM"
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%b %-d, %Y, %I:%M %p").to_string()
}

/// Label for a known status; anything else is echoed back
pub fn format_status(status: &str) -> String {
    match status.parse::<ReportStatus>() {
        Ok(status) => status.label().to_string(),
        Err(_) => status.to_string(),
    }
}
