use crate::builder::{localize, sanitize_block, sanitize_line};
use crate::error::EventError;
use crate::model::{EventRecord, RecurringScheduleSpec};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use chrono_tz::Tz;

/// Every date of `year-month` that falls on `weekday`, in order.
pub fn weekdays_in_month(
    year: i32,
    month: u32,
    weekday: Weekday,
) -> Result<Vec<NaiveDate>, EventError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(EventError::InvalidMonth { year, month })?;
    Ok(first
        .iter_days()
        .take_while(|day| day.month() == month)
        .filter(|day| day.weekday() == weekday)
        .collect())
}

/// Expands weekly slots into concrete events for one month.
#[derive(Debug, Clone, Copy)]
pub struct RecurringScheduleGenerator {
    timezone: Tz,
}

impl RecurringScheduleGenerator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn generate(
        &self,
        year: i32,
        month: u32,
        spec: &RecurringScheduleSpec,
    ) -> Result<Vec<EventRecord>, EventError> {
        let duration = Duration::minutes(i64::from(spec.duration_minutes));
        let title = sanitize_line(&spec.title);
        let category = sanitize_line(&spec.category);
        let description = match &spec.url {
            Some(url) => format!("{url}\n{}", sanitize_block(&spec.description)),
            None => sanitize_block(&spec.description),
        };

        weekdays_in_month(year, month, spec.weekday)?
            .into_iter()
            .map(|day| -> Result<EventRecord, EventError> {
                let start = localize(self.timezone, day.and_time(spec.start.to_naive_time()), &title)?;
                Ok(EventRecord {
                    title: title.clone(),
                    category: category.clone(),
                    start,
                    end: start + duration,
                    description: description.clone(),
                    url: spec.url.clone(),
                })
            })
            .collect()
    }
}
