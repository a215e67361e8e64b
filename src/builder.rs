use crate::config::CalendarConfig;
use crate::error::EventError;
use crate::model::{EventRecord, RawDetailPage, TimeOfDay, TitleOverride};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static DATE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9.]+").expect("invalid regex: date run"));

/// Turns one scraped detail page plus its parsed start time into an [`EventRecord`].
#[derive(Debug, Clone)]
pub struct EventRecordBuilder {
    timezone: Tz,
    base_url: Url,
    default_duration: Duration,
    excluded_title_markers: Vec<String>,
    overrides: Vec<TitleOverride>,
}

impl EventRecordBuilder {
    pub fn new(timezone: Tz, base_url: Url, default_duration_minutes: u32) -> Self {
        Self {
            timezone,
            base_url,
            default_duration: Duration::minutes(i64::from(default_duration_minutes)),
            excluded_title_markers: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        Ok(Self::new(
            config.timezone()?,
            config.base_url()?,
            config.event.default_duration_minutes,
        )
        .with_excluded_markers(config.event.excluded_title_markers.clone())
        .with_overrides(config.event.overrides.clone()))
    }

    pub fn with_excluded_markers(mut self, markers: Vec<String>) -> Self {
        self.excluded_title_markers = markers;
        self
    }

    pub fn with_overrides(mut self, overrides: Vec<TitleOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Titles carrying an excluded marker are scheduled elsewhere (the weekly radio slot).
    pub fn is_excluded(&self, title: &str) -> bool {
        self.excluded_title_markers
            .iter()
            .any(|marker| !marker.is_empty() && title.contains(marker.as_str()))
    }

    fn override_for(&self, title: &str) -> Option<&TitleOverride> {
        self.overrides
            .iter()
            .find(|rule| title.contains(rule.title_contains.as_str()))
    }

    /// `Ok(None)` for excluded titles; `Err` when the date can't be read.
    pub fn build(
        &self,
        detail: &RawDetailPage,
        parsed_time: TimeOfDay,
    ) -> Result<Option<EventRecord>, EventError> {
        let title = sanitize_line(&detail.title);
        if self.is_excluded(&title) {
            return Ok(None);
        }

        let date = parse_listing_date(&detail.date_text).ok_or_else(|| EventError::MalformedDate {
            title: title.clone(),
            text: detail.date_text.clone(),
        })?;

        let (time, duration) = match self.override_for(&title) {
            Some(rule) => (
                rule.start,
                Duration::minutes(i64::from(rule.duration_minutes)),
            ),
            None => (parsed_time, self.default_duration),
        };

        let start = localize(self.timezone, date.and_time(time.to_naive_time()), &title)?;
        let end = start + duration;
        let url = self.detail_url(&detail.href);

        Ok(Some(EventRecord {
            category: sanitize_line(&detail.category),
            description: compose_description(&url, &detail.body_paragraphs),
            url: Some(url),
            title,
            start,
            end,
        }))
    }

    fn detail_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        self.base_url
            .join(href)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

/// First `digits.dots` run of the date label, read as `YYYY.MM.DD`.
pub fn parse_listing_date(text: &str) -> Option<NaiveDate> {
    let run = DATE_RUN.find(text)?;
    let run = run.as_str().trim_matches('.');
    NaiveDate::parse_from_str(run, "%Y.%m.%d").ok()
}

pub(crate) fn localize(
    timezone: Tz,
    local: NaiveDateTime,
    title: &str,
) -> Result<DateTime<Tz>, EventError> {
    timezone
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| timezone.from_local_datetime(&local).latest())
        .ok_or_else(|| EventError::NonexistentLocalTime {
            title: title.to_string(),
            local,
            timezone: timezone.name().to_string(),
        })
}

fn compose_description(url: &str, paragraphs: &[String]) -> String {
    let mut description = format!("{url}\n");
    for paragraph in paragraphs {
        description.push_str(&sanitize_block(paragraph));
        description.push('\n');
    }
    description
}

/// Single-line text: whitespace collapsed, control characters dropped.
pub(crate) fn sanitize_line(value: &str) -> String {
    value
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-line text: keeps `\n`, drops every other control character.
pub(crate) fn sanitize_block(value: &str) -> String {
    value
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect()
}
