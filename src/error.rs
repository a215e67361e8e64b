use chrono::NaiveDateTime;
use thiserror::Error;

/// Failures scoped to a single event. The pipeline logs these and moves on.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("no date found in {text:?} for event {title:?}")]
    MalformedDate { title: String, text: String },

    #[error("local time {local} does not exist in {timezone} for event {title:?}")]
    NonexistentLocalTime {
        title: String,
        local: NaiveDateTime,
        timezone: String,
    },

    #[error("invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}
