use chrono::{Duration, NaiveDate, NaiveTime};
use rrule::{RRuleSet, Tz as RRuleTz};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Default cap on enumerated occurrences when the caller does not specify one.
pub const DEFAULT_ENUMERATION_CAP: usize = 30;

/// Hard upper bound handed to the rrule iterator; windows and caps narrow it.
const ITERATION_LIMIT: u16 = 1000;

/// Base recurrence frequency exposed by the API.
///
/// `custom` derives its RRULE frequency from the options provided: a weekday
/// set means WEEKLY, a day-of-month means MONTHLY, otherwise DAILY.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
            Frequency::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            "custom" => Ok(Frequency::Custom),
            other => Err(CoreError::InvalidInput(format!(
                "invalid frequency: {other}"
            ))),
        }
    }
}

/// RFC 5545 BYDAY token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecurWeekday {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl fmt::Display for RecurWeekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            RecurWeekday::Mo => "MO",
            RecurWeekday::Tu => "TU",
            RecurWeekday::We => "WE",
            RecurWeekday::Th => "TH",
            RecurWeekday::Fr => "FR",
            RecurWeekday::Sa => "SA",
            RecurWeekday::Su => "SU",
        };
        write!(f, "{token}")
    }
}

impl FromStr for RecurWeekday {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MO" => Ok(RecurWeekday::Mo),
            "TU" => Ok(RecurWeekday::Tu),
            "WE" => Ok(RecurWeekday::We),
            "TH" => Ok(RecurWeekday::Th),
            "FR" => Ok(RecurWeekday::Fr),
            "SA" => Ok(RecurWeekday::Sa),
            "SU" => Ok(RecurWeekday::Su),
            other => Err(CoreError::InvalidInput(format!("invalid weekday: {other}"))),
        }
    }
}

/// Recurrence configuration submitted by the API; the engine converts it to
/// an RFC 5545 RRULE string for storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceConfig {
    pub frequency: Frequency,
    /// Repeat every N frequency units
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// For weekly/custom frequency: which days to repeat on
    #[serde(default)]
    pub days_of_week: Option<Vec<RecurWeekday>>,
    /// For monthly/custom frequency: which day of the month
    #[serde(default)]
    pub day_of_month: Option<u32>,
    /// Date on which the series ends (exclusive with `end_count`)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Number of occurrences after which the series ends (exclusive with
    /// `end_date`)
    #[serde(default)]
    pub end_count: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: 1,
            days_of_week: None,
            day_of_month: None,
            end_date: None,
            end_count: None,
        }
    }
}

impl RecurrenceConfig {
    /// Validates the configuration against the constraints the API promises.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval < 1 || self.interval > 365 {
            return Err(CoreError::InvalidInput(
                "interval must be between 1 and 365".to_string(),
            ));
        }
        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(CoreError::InvalidInput(
                    "day_of_month must be between 1 and 31".to_string(),
                ));
            }
        }
        if let Some(count) = self.end_count {
            if !(1..=365).contains(&count) {
                return Err(CoreError::InvalidInput(
                    "end_count must be between 1 and 365".to_string(),
                ));
            }
        }
        if self.end_date.is_some() && self.end_count.is_some() {
            return Err(CoreError::InvalidInput(
                "end_date and end_count are mutually exclusive".to_string(),
            ));
        }
        let has_days = self
            .days_of_week
            .as_ref()
            .map(|d| !d.is_empty())
            .unwrap_or(false);
        if has_days && !matches!(self.frequency, Frequency::Weekly | Frequency::Custom) {
            return Err(CoreError::InvalidInput(
                "days_of_week is only valid for weekly or custom frequency".to_string(),
            ));
        }
        if self.day_of_month.is_some()
            && !matches!(self.frequency, Frequency::Monthly | Frequency::Custom)
        {
            return Err(CoreError::InvalidInput(
                "day_of_month is only valid for monthly or custom frequency".to_string(),
            ));
        }
        Ok(())
    }

    /// Formats the configuration as a deterministic RFC 5545 RRULE string.
    ///
    /// `INTERVAL=1` is omitted; an end date emits `UNTIL=YYYYMMDD`, an end
    /// count emits `COUNT=n`.
    pub fn to_rrule(&self) -> Result<String, CoreError> {
        self.validate()?;

        let freq = match self.frequency {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
            Frequency::Custom => {
                let has_days = self
                    .days_of_week
                    .as_ref()
                    .map(|d| !d.is_empty())
                    .unwrap_or(false);
                if has_days {
                    "WEEKLY"
                } else if self.day_of_month.is_some() {
                    "MONTHLY"
                } else {
                    "DAILY"
                }
            }
        };

        let mut parts = vec![format!("FREQ={freq}")];

        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }

        if let Some(days) = &self.days_of_week {
            if !days.is_empty() {
                let tokens: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                parts.push(format!("BYDAY={}", tokens.join(",")));
            }
        }

        if let Some(day) = self.day_of_month {
            parts.push(format!("BYMONTHDAY={day}"));
        }

        if let Some(end) = self.end_date {
            parts.push(format!("UNTIL={}", end.format("%Y%m%d")));
        }

        if let Some(count) = self.end_count {
            parts.push(format!("COUNT={count}"));
        }

        Ok(parts.join(";"))
    }
}

/// Builds an `RRuleSet` for a stored rule, anchored at midnight UTC of the
/// series anchor date.
fn rule_set(rrule: &str, anchor: NaiveDate) -> Result<RRuleSet, CoreError> {
    let dtstart = anchor.and_time(NaiveTime::MIN);
    let definition = format!("DTSTART:{}\nRRULE:{}", dtstart.format("%Y%m%dT%H%M%SZ"), rrule);
    definition
        .parse::<RRuleSet>()
        .map_err(|e| CoreError::InvalidRRule(format!("failed to parse RRULE '{rrule}': {e}")))
}

/// Enumerates occurrence dates of `rrule` (anchored at `anchor`) that fall
/// inside `[window_start, window_end]`, at most `cap` of them, in ascending
/// order.
///
/// COUNT rules are counted from the anchor, not from the window start. Pure
/// and safe to call concurrently.
pub fn enumerate_dates(
    rrule: &str,
    anchor: NaiveDate,
    window_start: NaiveDate,
    window_end: NaiveDate,
    cap: usize,
) -> Result<Vec<NaiveDate>, CoreError> {
    if window_end < window_start || cap == 0 {
        return Ok(Vec::new());
    }

    let set = rule_set(rrule, anchor)?;

    // Bound the iterator to the window; the in-loop filter below keeps the
    // result correct regardless of boundary inclusivity.
    let after = (window_start.and_time(NaiveTime::MIN) - Duration::seconds(1))
        .and_utc()
        .with_timezone(&RRuleTz::UTC);
    let before = window_end
        .and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
        .and_utc()
        .with_timezone(&RRuleTz::UTC);

    let (instants, _) = set.after(after).before(before).all(ITERATION_LIMIT);

    let mut dates = Vec::with_capacity(cap.min(instants.len()));
    for instant in instants {
        let date = instant.date_naive();
        if date < window_start {
            continue;
        }
        if date > window_end {
            break;
        }
        dates.push(date);
        if dates.len() >= cap {
            break;
        }
    }

    Ok(dates)
}

/// Returns the smallest occurrence date strictly after `after`, or `None`
/// when the rule is exhausted (UNTIL passed or COUNT consumed).
pub fn next_occurrence_after(
    rrule: &str,
    anchor: NaiveDate,
    after: NaiveDate,
) -> Result<Option<NaiveDate>, CoreError> {
    let window_start = after + Duration::days(1);
    let window_end = after + Duration::days(366);
    let dates = enumerate_dates(rrule, anchor, window_start, window_end, 1)?;
    Ok(dates.into_iter().next())
}

/// Checks whether an RRULE string is parseable in the subset this engine
/// consumes.
pub fn validate_rrule(rrule: &str) -> bool {
    // Anchor choice is irrelevant for parse validity; a fixed probe keeps
    // this function pure.
    let probe = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    rule_set(rrule, probe).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mwf_config() -> RecurrenceConfig {
        RecurrenceConfig {
            frequency: Frequency::Weekly,
            days_of_week: Some(vec![RecurWeekday::Mo, RecurWeekday::We, RecurWeekday::Fr]),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(RecurrenceConfig::default(), "FREQ=DAILY")]
    #[case(
        RecurrenceConfig { frequency: Frequency::Daily, interval: 2, ..Default::default() },
        "FREQ=DAILY;INTERVAL=2"
    )]
    #[case(mwf_config(), "FREQ=WEEKLY;BYDAY=MO,WE,FR")]
    #[case(
        RecurrenceConfig {
            frequency: Frequency::Monthly,
            day_of_month: Some(15),
            ..Default::default()
        },
        "FREQ=MONTHLY;BYMONTHDAY=15"
    )]
    #[case(
        RecurrenceConfig { frequency: Frequency::Yearly, ..Default::default() },
        "FREQ=YEARLY"
    )]
    #[case(
        RecurrenceConfig {
            frequency: Frequency::Daily,
            end_count: Some(10),
            ..Default::default()
        },
        "FREQ=DAILY;COUNT=10"
    )]
    fn test_config_to_rrule(#[case] config: RecurrenceConfig, #[case] expected: &str) {
        assert_eq!(config.to_rrule().unwrap(), expected);
    }

    #[test]
    fn test_custom_frequency_derivation() {
        let weekly = RecurrenceConfig {
            frequency: Frequency::Custom,
            days_of_week: Some(vec![RecurWeekday::Tu, RecurWeekday::Th]),
            ..Default::default()
        };
        assert_eq!(weekly.to_rrule().unwrap(), "FREQ=WEEKLY;BYDAY=TU,TH");

        let monthly = RecurrenceConfig {
            frequency: Frequency::Custom,
            day_of_month: Some(1),
            ..Default::default()
        };
        assert_eq!(monthly.to_rrule().unwrap(), "FREQ=MONTHLY;BYMONTHDAY=1");

        let daily = RecurrenceConfig {
            frequency: Frequency::Custom,
            interval: 3,
            ..Default::default()
        };
        assert_eq!(daily.to_rrule().unwrap(), "FREQ=DAILY;INTERVAL=3");
    }

    #[test]
    fn test_end_date_formats_until() {
        let config = RecurrenceConfig {
            frequency: Frequency::Daily,
            end_date: Some(date(2026, 3, 15)),
            ..Default::default()
        };
        assert_eq!(config.to_rrule().unwrap(), "FREQ=DAILY;UNTIL=20260315");
    }

    #[test]
    fn test_end_date_and_count_rejected() {
        let config = RecurrenceConfig {
            frequency: Frequency::Daily,
            end_date: Some(date(2026, 3, 15)),
            end_count: Some(5),
            ..Default::default()
        };
        assert!(matches!(
            config.to_rrule(),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[rstest]
    #[case(RecurrenceConfig { interval: 0, ..Default::default() })]
    #[case(RecurrenceConfig { interval: 400, ..Default::default() })]
    #[case(RecurrenceConfig {
        frequency: Frequency::Monthly,
        day_of_month: Some(32),
        ..Default::default()
    })]
    #[case(RecurrenceConfig {
        frequency: Frequency::Daily,
        days_of_week: Some(vec![RecurWeekday::Mo]),
        ..Default::default()
    })]
    #[case(RecurrenceConfig {
        frequency: Frequency::Weekly,
        day_of_month: Some(3),
        ..Default::default()
    })]
    #[case(RecurrenceConfig { end_count: Some(0), ..Default::default() })]
    fn test_invalid_configs_rejected(#[case] config: RecurrenceConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weekly_mwf_first_twelve_occurrences() {
        let rrule = mwf_config().to_rrule().unwrap();
        let anchor = date(2026, 1, 5); // a Monday

        let dates =
            enumerate_dates(&rrule, anchor, anchor, anchor + Duration::days(60), 12).unwrap();

        let expected: Vec<NaiveDate> = [5, 7, 9, 12, 14, 16, 19, 21, 23, 26, 28, 30]
            .iter()
            .map(|d| date(2026, 1, *d))
            .collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn test_weekly_mwf_thirty_day_window() {
        let rrule = mwf_config().to_rrule().unwrap();
        let anchor = date(2026, 1, 5);

        let dates = enumerate_dates(
            &rrule,
            anchor,
            anchor,
            anchor + Duration::days(30),
            DEFAULT_ENUMERATION_CAP,
        )
        .unwrap();

        assert_eq!(dates.first(), Some(&date(2026, 1, 5)));
        assert_eq!(dates.last(), Some(&date(2026, 2, 4)));
        assert_eq!(dates.len(), 14);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_enumerate_respects_cap() {
        let dates =
            enumerate_dates("FREQ=DAILY", date(2026, 1, 1), date(2026, 1, 1), date(2026, 12, 31), 5)
                .unwrap();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[4], date(2026, 1, 5));
    }

    #[test]
    fn test_enumerate_filters_window_start() {
        // Window starts after the anchor: earlier occurrences are dropped but
        // still consume COUNT.
        let dates = enumerate_dates(
            "FREQ=DAILY;COUNT=5",
            date(2026, 1, 1),
            date(2026, 1, 3),
            date(2026, 1, 31),
            30,
        )
        .unwrap();
        assert_eq!(
            dates,
            vec![date(2026, 1, 3), date(2026, 1, 4), date(2026, 1, 5)]
        );
    }

    #[test]
    fn test_enumerate_until_bound() {
        let dates = enumerate_dates(
            "FREQ=DAILY;UNTIL=20260110",
            date(2026, 1, 5),
            date(2026, 1, 5),
            date(2026, 1, 31),
            30,
        )
        .unwrap();
        assert_eq!(dates.first(), Some(&date(2026, 1, 5)));
        assert_eq!(dates.last(), Some(&date(2026, 1, 10)));
    }

    #[test]
    fn test_enumerate_empty_window() {
        let dates =
            enumerate_dates("FREQ=DAILY", date(2026, 1, 1), date(2026, 2, 1), date(2026, 1, 1), 30)
                .unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn test_next_occurrence_after() {
        let rrule = mwf_config().to_rrule().unwrap();
        let anchor = date(2026, 1, 5);

        assert_eq!(
            next_occurrence_after(&rrule, anchor, date(2026, 1, 5)).unwrap(),
            Some(date(2026, 1, 7))
        );
        assert_eq!(
            next_occurrence_after(&rrule, anchor, date(2026, 1, 9)).unwrap(),
            Some(date(2026, 1, 12))
        );
    }

    #[test]
    fn test_next_occurrence_exhausted_rule() {
        let next =
            next_occurrence_after("FREQ=DAILY;COUNT=3", date(2026, 1, 1), date(2026, 1, 3))
                .unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_validate_rrule() {
        assert!(validate_rrule("FREQ=DAILY"));
        assert!(validate_rrule("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,FR"));
        assert!(validate_rrule("FREQ=MONTHLY;BYMONTHDAY=15;COUNT=12"));
        assert!(!validate_rrule("NOT_A_RULE"));
        assert!(!validate_rrule("FREQ=SOMETIMES"));
    }

    #[test]
    fn test_invalid_rrule_errors() {
        let result = enumerate_dates(
            "GIBBERISH",
            date(2026, 1, 1),
            date(2026, 1, 1),
            date(2026, 1, 31),
            30,
        );
        assert!(matches!(result, Err(CoreError::InvalidRRule(_))));
    }

    proptest! {
        /// Enumerated sequences are strictly increasing, stay inside the
        /// window, and daily intervals produce exact gaps.
        #[test]
        fn prop_daily_enumeration_is_ordered(interval in 1u32..=30, span in 1i64..=120) {
            let config = RecurrenceConfig {
                frequency: Frequency::Daily,
                interval,
                ..Default::default()
            };
            let rrule = config.to_rrule().unwrap();
            let anchor = date(2026, 1, 1);
            let window_end = anchor + Duration::days(span);

            let dates = enumerate_dates(&rrule, anchor, anchor, window_end, 365).unwrap();

            prop_assert!(!dates.is_empty());
            prop_assert_eq!(dates[0], anchor);
            for pair in dates.windows(2) {
                prop_assert_eq!(pair[1] - pair[0], Duration::days(i64::from(interval)));
            }
            for d in &dates {
                prop_assert!(*d >= anchor && *d <= window_end);
            }
        }
    }
}
