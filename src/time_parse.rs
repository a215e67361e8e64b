//! Start-time heuristics for free-text event descriptions.
//!
//! Descriptions on the detail pages mention times in a handful of loose
//! shapes (`18:00頃〜`, `開場18:00/開演18:30`, `OPEN 17:00 / START 18:00`, ...).
//! Patterns are tried in a fixed order and the first one that yields a valid
//! time wins; nothing tries to rank matches against each other.

use crate::model::TimeOfDay;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// What a successful pattern captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMatch {
    /// `H:MM頃〜`: the event simply starts around this time.
    StartOnly(TimeOfDay),
    OpenStart { open: TimeOfDay, start: TimeOfDay },
    /// Only the doors time is known; it stands in for the start.
    OpenOnly(TimeOfDay),
}

impl TimeMatch {
    pub fn start(&self) -> TimeOfDay {
        match self {
            TimeMatch::StartOnly(start) => *start,
            TimeMatch::OpenStart { start, .. } => *start,
            TimeMatch::OpenOnly(open) => *open,
        }
    }

    pub fn open(&self) -> Option<TimeOfDay> {
        match self {
            TimeMatch::StartOnly(_) => None,
            TimeMatch::OpenStart { open, .. } => Some(*open),
            TimeMatch::OpenOnly(open) => Some(*open),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PatternKind {
    StartOnly,
    OpenStart,
    OpenOnly,
}

struct TimePattern {
    name: &'static str,
    kind: PatternKind,
    regex: Regex,
}

impl TimePattern {
    fn new(name: &'static str, kind: PatternKind, pattern: &str) -> Self {
        Self {
            name,
            kind,
            regex: Regex::new(pattern).expect("invalid regex: time pattern"),
        }
    }

    fn extract(&self, text: &str) -> Option<TimeMatch> {
        self.regex
            .captures_iter(text)
            .find_map(|caps| self.interpret(&caps))
    }

    fn interpret(&self, caps: &Captures<'_>) -> Option<TimeMatch> {
        match self.kind {
            PatternKind::StartOnly => Some(TimeMatch::StartOnly(capture_time(caps, "sh", "sm")?)),
            PatternKind::OpenStart => Some(TimeMatch::OpenStart {
                open: capture_time(caps, "oh", "om")?,
                start: capture_time(caps, "sh", "sm")?,
            }),
            PatternKind::OpenOnly => Some(TimeMatch::OpenOnly(capture_time(caps, "oh", "om")?)),
        }
    }
}

fn capture_time(caps: &Captures<'_>, hour: &str, minute: &str) -> Option<TimeOfDay> {
    let hour = caps.name(hour)?.as_str().parse::<u32>().ok()?;
    let minute = caps.name(minute)?.as_str().parse::<u32>().ok()?;
    TimeOfDay::new(hour, minute)
}

// Separators: ASCII or full-width colon, ASCII or full-width slash.
static TIME_PATTERNS: LazyLock<Vec<TimePattern>> = LazyLock::new(|| {
    vec![
        TimePattern::new(
            "start_only",
            PatternKind::StartOnly,
            r"(?P<sh>\d{1,2})[:：](?P<sm>\d{2})\s*頃\s*[〜～~]",
        ),
        TimePattern::new(
            "open_start_ja",
            PatternKind::OpenStart,
            r"開場\s*[:：]?\s*(?P<oh>\d{1,2})[:：](?P<om>\d{2})\s*[/／]?\s*開演\s*[:：]?\s*(?P<sh>\d{1,2})[:：](?P<sm>\d{2})",
        ),
        TimePattern::new(
            "open_start_en",
            PatternKind::OpenStart,
            r"(?i)open\s*[:：]?\s*(?P<oh>\d{1,2})[:：](?P<om>\d{2})\s*[/／]?\s*start\s*[:：]?\s*(?P<sh>\d{1,2})[:：](?P<sm>\d{2})",
        ),
        TimePattern::new(
            "open_start_labels",
            PatternKind::OpenStart,
            r"(?i)(?:open|開場)\s*[/／]\s*(?:start|開演)\s*[:：]?\s*(?P<oh>\d{1,2})[:：](?P<om>\d{2})\s*[/／]\s*(?P<sh>\d{1,2})[:：](?P<sm>\d{2})",
        ),
        TimePattern::new(
            "open_only",
            PatternKind::OpenOnly,
            r"(?i)(?:open|開場)\s*[:：]?\s*(?P<oh>\d{1,2})[:：](?P<om>\d{2})",
        ),
    ]
});

/// Replaces NBSP leaked from upstream text extraction and folds full-width digits to ASCII.
fn normalize(description: &str) -> String {
    description
        .chars()
        .map(|c| match c {
            '\u{a0}' => ' ',
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            other => other,
        })
        .collect()
}

/// First pattern (in priority order) that yields a valid time.
pub fn parse_match(description: &str) -> Option<TimeMatch> {
    let text = normalize(description);
    for pattern in TIME_PATTERNS.iter() {
        if let Some(found) = pattern.extract(&text) {
            debug!(pattern = pattern.name, start = %found.start(), "time pattern matched");
            return Some(found);
        }
    }
    None
}

/// Start time of the event, or `00:00` when no pattern matches.
pub fn parse(description: &str) -> TimeOfDay {
    parse_match(description)
        .map(|found| found.start())
        .unwrap_or_default()
}
