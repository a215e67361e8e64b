use crate::model::EventRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CalendarMeta<'a> {
    pub prodid: &'a str,
    pub name: Option<&'a str>,
    pub timezone: &'a str,
}

pub fn render_calendar(meta: &CalendarMeta<'_>, events: &[EventRecord], stamp: DateTime<Utc>) -> String {
    let mut lines = Vec::new();
    push_line(&mut lines, "BEGIN:VCALENDAR".to_string());
    push_line(&mut lines, "VERSION:2.0".to_string());
    push_line(&mut lines, format!("PRODID:{}", meta.prodid));
    push_line(&mut lines, "CALSCALE:GREGORIAN".to_string());
    push_line(&mut lines, "METHOD:PUBLISH".to_string());
    if let Some(name) = meta.name {
        push_line(&mut lines, format!("X-WR-CALNAME:{}", escape_text(name)));
    }
    push_line(&mut lines, format!("X-WR-TIMEZONE:{}", meta.timezone));

    for event in events {
        append_event_lines(&mut lines, event, stamp);
    }

    push_line(&mut lines, "END:VCALENDAR".to_string());
    lines.join("\r\n") + "\r\n"
}

/// Appends one rendered calendar to `path`, creating it if needed. Earlier runs are left untouched.
pub fn append_calendar(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir {}", parent.display()))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open ics {}", path.display()))?;
    file.write_all(rendered.as_bytes())
        .with_context(|| format!("failed to write ics {}", path.display()))?;
    Ok(())
}

fn append_event_lines(lines: &mut Vec<String>, event: &EventRecord, stamp: DateTime<Utc>) {
    push_line(lines, "BEGIN:VEVENT".to_string());
    push_line(lines, format!("UID:{}", event.uid()));
    push_line(lines, format!("DTSTAMP:{}", format_utc(stamp)));
    push_line(
        lines,
        format!("DTSTART:{}", format_utc(event.start.with_timezone(&Utc))),
    );
    push_line(
        lines,
        format!("DTEND:{}", format_utc(event.end.with_timezone(&Utc))),
    );
    push_line(lines, format!("SUMMARY:{}", escape_text(&event.title)));
    if !event.category.is_empty() {
        push_line(lines, format!("CATEGORIES:{}", escape_text(&event.category)));
    }
    if !event.description.is_empty() {
        push_line(lines, format!("DESCRIPTION:{}", escape_text(&event.description)));
    }
    if let Some(url) = &event.url {
        push_line(lines, format!("URL:{}", url));
    }
    push_line(lines, "END:VEVENT".to_string());
}

fn push_line(lines: &mut Vec<String>, line: String) {
    for folded in fold_line(&line) {
        lines.push(folded);
    }
}

/// Splits at 75 octets on char boundaries; continuation lines start with a space.
fn fold_line(line: &str) -> Vec<String> {
    const LIMIT: usize = 75;

    if line.len() <= LIMIT {
        return vec![line.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in line.chars() {
        // continuation lines spend one octet on the leading space
        let limit = if chunks.is_empty() { LIMIT } else { LIMIT - 1 };
        if current.len() + ch.len_utf8() > limit {
            if chunks.is_empty() {
                chunks.push(current.clone());
            } else {
                chunks.push(format!(" {current}"));
            }
            current.clear();
        }
        current.push(ch);
    }

    if !current.is_empty() {
        if chunks.is_empty() {
            chunks.push(current);
        } else {
            chunks.push(format!(" {current}"));
        }
    }

    chunks
}

fn format_utc(value: DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        value.year(),
        value.month(),
        value.day(),
        value.hour(),
        value.minute(),
        value.second()
    )
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// A VEVENT read back from an `.ics` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IcsEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub categories: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IcsDocument {
    pub calendars: usize,
    pub events: Vec<IcsEvent>,
}

/// Reads every VEVENT of a file that may hold several appended VCALENDARs.
pub fn read_calendar(text: &str) -> IcsDocument {
    let mut document = IcsDocument::default();
    let mut current: Option<IcsEvent> = None;

    for line in unfold_lines(text) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.split(';').next().unwrap_or_default().to_ascii_uppercase();

        match (name.as_str(), value) {
            ("BEGIN", "VCALENDAR") => document.calendars += 1,
            ("BEGIN", "VEVENT") => current = Some(IcsEvent::default()),
            ("END", "VEVENT") => {
                if let Some(event) = current.take() {
                    document.events.push(event);
                }
            }
            _ => {
                let Some(event) = current.as_mut() else {
                    continue;
                };
                match name.as_str() {
                    "UID" => event.uid = Some(value.to_string()),
                    "SUMMARY" => event.summary = unescape_text(value),
                    "DTSTART" => event.start = parse_utc(value),
                    "DTEND" => event.end = parse_utc(value),
                    "CATEGORIES" => event.categories = Some(unescape_text(value)),
                    "DESCRIPTION" => event.description = Some(unescape_text(value)),
                    "URL" => event.url = Some(value.to_string()),
                    _ => {}
                }
            }
        }
    }

    document
}

fn unfold_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(continuation) = raw.strip_prefix([' ', '\t'])
            && let Some(last) = lines.last_mut()
        {
            last.push_str(continuation);
            continue;
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim().strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Asia::Tokyo;

    fn meta() -> CalendarMeta<'static> {
        CalendarMeta {
            prodid: "-//nao_y//CYNHN Unofficial Calendar//JP",
            name: Some("CYNHN"),
            timezone: "Asia/Tokyo",
        }
    }

    fn record(title: &str, description: &str) -> EventRecord {
        let start = Tokyo.with_ymd_and_hms(2024, 1, 4, 23, 30, 0).unwrap();
        EventRecord {
            title: title.to_string(),
            category: "MEDIA".to_string(),
            start,
            end: start + Duration::minutes(30),
            description: description.to_string(),
            url: Some("https://cynhn.com/contents/289980".to_string()),
        }
    }

    #[test]
    fn renders_required_properties() {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let text = render_calendar(&meta(), &[record("RADIO", "desc")], stamp);

        assert!(text.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(text.contains("PRODID:-//nao_y//CYNHN Unofficial Calendar//JP\r\n"));
        assert!(text.contains("DTSTART:20240104T143000Z\r\n"));
        assert!(text.contains("DTEND:20240104T150000Z\r\n"));
        assert!(text.contains("SUMMARY:RADIO\r\n"));
        assert!(text.contains("CATEGORIES:MEDIA\r\n"));
        assert!(text.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn fields_survive_a_write_read_cycle() {
        let original = record(
            "FM-FUJI「GIRLS♥GIRLS♥GIRLS =flying high= CYNHNの歌いまスウィーニー」; 特別編, 前半",
            "https://cynhn.com/contents/289980\n毎週木曜 23:30～24:00\\n literal\n",
        );
        let text = render_calendar(&meta(), std::slice::from_ref(&original), Utc::now());
        let document = read_calendar(&text);

        assert_eq!(document.calendars, 1);
        assert_eq!(document.events.len(), 1);
        let event = &document.events[0];
        assert_eq!(event.summary, original.title);
        assert_eq!(event.start, Some(original.start.with_timezone(&Utc)));
        assert_eq!(event.end, Some(original.end.with_timezone(&Utc)));
        assert_eq!(event.categories.as_deref(), Some("MEDIA"));
        assert_eq!(event.description.as_deref(), Some(original.description.as_str()));
        assert_eq!(event.uid, Some(original.uid()));
    }

    #[test]
    fn long_multibyte_lines_fold_on_char_boundaries() {
        let title = "綾瀬志希展〜脳〜".repeat(12);
        let text = render_calendar(&meta(), &[record(&title, "")], Utc::now());

        for line in text.split("\r\n") {
            assert!(line.len() <= 75, "line too long: {} octets", line.len());
        }
        assert_eq!(read_calendar(&text).events[0].summary, title);
    }

    #[test]
    fn control_characters_never_reach_output() {
        let text = render_calendar(&meta(), &[record("A\u{7}B", "x\u{0}y")], Utc::now());
        assert!(text.contains("SUMMARY:AB\r\n"));
        assert!(text.contains("DESCRIPTION:xy\r\n"));
    }

    #[test]
    fn appended_calendars_are_all_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out").join("cal.ics");
        let text = render_calendar(&meta(), &[record("RADIO", "")], Utc::now());
        append_calendar(&path, &text)?;
        append_calendar(&path, &text)?;

        let document = read_calendar(&std::fs::read_to_string(&path)?);
        assert_eq!(document.calendars, 2);
        assert_eq!(document.events.len(), 2);
        Ok(())
    }
}
