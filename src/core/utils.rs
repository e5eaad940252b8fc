//! Timestamp and pagination helpers shared by the repositories and services

use crate::core::error::{LeafError, Result};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Format a timestamp the way it is stored: `YYYY-MM-DDTHH:MM:SSZ`
///
/// Fixed width, so lexical order in SQL equals chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeafError::SerializationError(format!("Bad timestamp '{}': {}", value, e)))
}

/// Parse a `YYYY-MM-DD` date coming from a client into midnight UTC
pub fn parse_due_date(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        LeafError::ValidationError("Invalid date format. Please use YYYY-MM-DD".to_string())
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| LeafError::ValidationError("Invalid date".to_string()))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// `YYYY-MM-DD` rendering used in notification texts
pub fn display_date(ts: &str) -> String {
    parse_timestamp(ts)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

/// Whether `last_activity` falls inside the online window ending at `now`
pub fn is_recent(last_activity: Option<&str>, now: DateTime<Utc>, window_secs: i64) -> bool {
    match last_activity.and_then(|ts| parse_timestamp(ts).ok()) {
        Some(seen) => now - seen <= Duration::seconds(window_secs),
        None => false,
    }
}

/// Page window derived from 1-based `page` and `per_page`, clamped to sane bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(default_per_page)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip_is_second_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let s = format_timestamp(ts);
        assert_eq!(s, "2024-03-09T07:05:01Z");
        assert_eq!(parse_timestamp(&s).unwrap(), ts);
    }

    #[test]
    fn test_parse_due_date() {
        let due = parse_due_date("2030-01-15").unwrap();
        assert_eq!(format_timestamp(due), "2030-01-15T00:00:00Z");
        assert!(parse_due_date("15/01/2030").is_err());
        assert!(parse_due_date("2030-02-30").is_err());
    }

    #[test]
    fn test_is_recent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let four_min_ago = format_timestamp(now - Duration::minutes(4));
        let ten_min_ago = format_timestamp(now - Duration::minutes(10));

        assert!(is_recent(Some(&four_min_ago), now, 300));
        assert!(!is_recent(Some(&ten_min_ago), now, 300));
        assert!(!is_recent(None, now, 300));
    }

    #[test]
    fn test_page_request_clamps() {
        let p = PageRequest::new(Some(0), Some(500), 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, 100);
        assert_eq!(p.offset(), 0);

        let p = PageRequest::new(Some(3), None, 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }
}
