use chrono::{DateTime, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Wall-clock time without a date. `(0, 0)` doubles as "unknown time".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = value
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {value:?}"))?;
        let hour = hour
            .parse::<u32>()
            .map_err(|_| format!("invalid hour in {value:?}"))?;
        let minute = minute
            .parse::<u32>()
            .map_err(|_| format!("invalid minute in {value:?}"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("time out of range: {value:?}"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Fields lifted off one event detail page, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDetailPage {
    pub href: String,
    pub title: String,
    pub category: String,
    pub date_text: String,
    pub body_paragraphs: Vec<String>,
}

impl RawDetailPage {
    pub fn body_text(&self) -> String {
        self.body_paragraphs.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub title: String,
    pub category: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub description: String,
    pub url: Option<String>,
}

impl EventRecord {
    pub fn uid(&self) -> String {
        let identity = format!("{}::{}", self.title, self.start.to_rfc3339());
        let digest = Sha256::digest(identity.as_bytes());
        let short = &hex::encode(digest)[..24];
        format!("{short}@cynhn-cal.local")
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A weekly slot synthesised into every matching day of a month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringScheduleSpec {
    pub weekday: Weekday,
    pub start: TimeOfDay,
    pub duration_minutes: u32,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Replaces start time and duration for any event whose title contains `title_contains`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitleOverride {
    pub title_contains: String,
    pub start: TimeOfDay,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub links_found: usize,
    pub pages_fetched: usize,
    pub records_built: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub excluded: usize,
    pub failed: usize,
    pub recurring: usize,
    pub events_written: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_of_day_parses_and_displays() {
        let t: TimeOfDay = "23:30".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (23, 30));
        assert_eq!(t.to_string(), "23:30");
        assert_eq!("9:05".parse::<TimeOfDay>().unwrap().to_string(), "09:05");
    }

    #[test]
    fn time_of_day_rejects_out_of_range() {
        assert!(TimeOfDay::new(24, 0).is_none());
        assert!(TimeOfDay::new(12, 60).is_none());
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn default_time_is_midnight() {
        assert_eq!(TimeOfDay::default(), TimeOfDay::MIDNIGHT);
    }
}
