use crate::model::EventRecord;
use std::collections::HashSet;

/// Ordered event collection that refuses a second record with an identical title.
///
/// The listing links the same detail page from every calendar day it spans,
/// and the pages carry no stable id, so the exact title is the dedup key.
/// Comparison is byte-for-byte; no Unicode normalisation is applied.
#[derive(Debug, Default)]
pub struct EventCollector {
    records: Vec<EventRecord>,
    titles: HashSet<String>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and drops the record) when the title was already accepted.
    pub fn accept(&mut self, record: EventRecord) -> bool {
        if !self.titles.insert(record.title.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Appends without the title check; used for synthesised recurring slots.
    pub fn append(&mut self, records: impl IntoIterator<Item = EventRecord>) {
        self.records.extend(records);
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.titles.contains(title)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Asia::Tokyo;

    fn record(title: &str, day: u32) -> EventRecord {
        let start = Tokyo.with_ymd_and_hms(2024, 6, day, 18, 0, 0).unwrap();
        EventRecord {
            title: title.to_string(),
            category: "LIVE".to_string(),
            start,
            end: start + Duration::minutes(150),
            description: String::new(),
            url: None,
        }
    }

    #[test]
    fn identical_titles_collapse_to_one() {
        let mut collector = EventCollector::new();
        assert!(collector.accept(record("ツアーファイナル", 1)));
        assert!(!collector.accept(record("ツアーファイナル", 2)));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.records()[0].start.date_naive().to_string(), "2024-06-01");
    }

    #[test]
    fn distinct_titles_are_all_kept_in_order() {
        let mut collector = EventCollector::new();
        let titles = ["A", "B", "C", "a"];
        for (i, title) in titles.iter().enumerate() {
            assert!(collector.accept(record(title, i as u32 + 1)));
        }
        assert_eq!(collector.len(), titles.len());
        let kept: Vec<_> = collector.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(kept, titles);
    }

    #[test]
    fn comparison_is_byte_exact() {
        let mut collector = EventCollector::new();
        // precomposed vs combining dakuten
        assert!(collector.accept(record("ガ", 1)));
        assert!(collector.accept(record("カ\u{3099}", 1)));
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn append_skips_title_check() {
        let mut collector = EventCollector::new();
        collector.accept(record("RADIO", 1));
        collector.append(vec![record("RADIO", 8), record("RADIO", 15)]);
        assert_eq!(collector.len(), 3);
        assert!(collector.contains_title("RADIO"));
        assert!(!collector.is_empty());
    }
}
