use crate::error::CoreError;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Validate an IANA timezone name and return the parsed zone.
pub fn validate_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// The calendar date at `at` in the given zone.
pub fn local_date(tz: &Tz, at: DateTime<Utc>) -> chrono::NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// The local hour of day at `at` in the given zone.
pub fn local_hour(tz: &Tz, at: DateTime<Utc>) -> u32 {
    at.with_timezone(tz).hour()
}

/// The UTC instant at which the local day containing `at` began.
///
/// When midnight does not exist locally (a DST spring-forward gap), the first
/// valid instant after it is used.
pub fn local_day_start_utc(tz: &Tz, at: DateTime<Utc>) -> DateTime<Utc> {
    let day = at.with_timezone(tz).date_naive();
    let midnight = day.and_time(NaiveTime::MIN);

    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(at)
}

/// Curated list of common timezones for user selection.
pub fn common_timezones() -> Vec<&'static str> {
    vec![
        "UTC",
        "America/New_York",
        "America/Chicago",
        "America/Denver",
        "America/Los_Angeles",
        "America/Sao_Paulo",
        "Europe/London",
        "Europe/Paris",
        "Europe/Berlin",
        "Europe/Rome",
        "Europe/Madrid",
        "Asia/Tokyo",
        "Asia/Shanghai",
        "Asia/Kolkata",
        "Asia/Karachi",
        "Asia/Dubai",
        "Australia/Sydney",
        "Australia/Melbourne",
        "Pacific/Auckland",
    ]
}

/// Every IANA timezone name chrono-tz knows about.
pub fn available_timezones() -> impl Iterator<Item = &'static str> {
    chrono_tz::TZ_VARIANTS.iter().map(|tz| tz.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("Asia/Karachi").is_ok());
        assert!(matches!(
            validate_timezone("Mars/Olympus_Mons"),
            Err(CoreError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_local_date_and_hour() {
        let tz = validate_timezone("Asia/Karachi").unwrap();
        // 03:05 UTC is 08:05 in Karachi (UTC+5)
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 3, 5, 0).unwrap();
        assert_eq!(local_hour(&tz, at), 8);
        assert_eq!(
            local_date(&tz, at),
            chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_local_day_start_crosses_utc_midnight() {
        let tz = validate_timezone("Asia/Karachi").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 3, 5, 0).unwrap();
        // Karachi's March 10 began at 19:00 UTC on March 9.
        assert_eq!(
            local_day_start_utc(&tz, at),
            Utc.with_ymd_and_hms(2026, 3, 9, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_timezone_listings() {
        assert!(common_timezones().contains(&"UTC"));
        assert!(available_timezones().any(|name| name == "Asia/Karachi"));
    }
}
