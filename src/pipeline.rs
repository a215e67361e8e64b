use crate::builder::EventRecordBuilder;
use crate::collector::EventCollector;
use crate::config::{CalendarConfig, LoadedConfig, load_config};
use crate::fetch::{PageSource, open_page_source};
use crate::ics::{CalendarMeta, append_calendar, read_calendar, render_calendar};
use crate::model::RunReport;
use crate::schedule::RecurringScheduleGenerator;
use crate::scrape::{DetailSelectors, extract_detail_hrefs};
use crate::time_parse;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub config_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub config_path: Option<PathBuf>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub calendars: usize,
    pub events: usize,
    pub distinct_events: usize,
    /// Same title and start written more than once, i.e. by repeated runs against one file.
    pub repeated_events: Vec<RepeatedEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RepeatedEvent {
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub copies: usize,
}

pub fn sync_calendar(options: &SyncOptions) -> Result<RunReport> {
    let loaded = load_config(options.config_path.as_deref())?;
    let source = open_page_source(&loaded)?;

    let timezone = loaded.config.timezone()?;
    let today = Utc::now().with_timezone(&timezone).date_naive();
    let year = options.year.unwrap_or(today.year());
    let month = options.month.unwrap_or(today.month());

    let mut report = RunReport::default();
    let collector = collect_events(&loaded.config, source.as_ref(), year, month, &mut report)?;

    let rendered = render_calendar(
        &CalendarMeta {
            prodid: &loaded.config.output.prodid,
            name: loaded.config.output.calendar_name.as_deref(),
            timezone: &loaded.config.site.timezone,
        },
        collector.records(),
        Utc::now(),
    );

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| loaded.resolve(&loaded.config.output.path));

    if options.dry_run {
        info!(events = collector.len(), "dry run enabled; calendar not written");
    } else {
        append_calendar(&output, &rendered)?;
        report.events_written = collector.len();
        info!(
            events = report.events_written,
            file = %output.display(),
            "calendar appended"
        );
    }

    Ok(report)
}

/// Scrapes the listing, builds and dedups records, then adds the recurring slots for `year-month`.
///
/// Failures on individual pages are logged and counted; only a listing failure is fatal.
pub fn collect_events(
    config: &CalendarConfig,
    source: &dyn PageSource,
    year: i32,
    month: u32,
    report: &mut RunReport,
) -> Result<EventCollector> {
    let builder = EventRecordBuilder::from_config(config)?;
    let selectors = DetailSelectors::from_config(&config.detail)?;

    let listing = source.listing().context("failed to load listing page")?;
    let hrefs = extract_detail_hrefs(&listing.text(), &config.listing)?;
    report.links_found = hrefs.len();
    info!(url = %listing.source_url, links = hrefs.len(), "listing parsed");

    let mut collector = EventCollector::new();

    for href in &hrefs {
        let page = match source.page(href) {
            Ok(page) => page,
            Err(err) => {
                let error = format!("{err:#}");
                warn!(%href, %error, "detail fetch failed; skipping");
                report.failed += 1;
                continue;
            }
        };
        report.pages_fetched += 1;

        let detail = match selectors.parse_detail_page(href, &page.text()) {
            Ok(detail) => detail,
            Err(err) => {
                warn!(%href, error = %err, "detail page unreadable; skipping");
                report.failed += 1;
                continue;
            }
        };

        let time = time_parse::parse(&detail.body_text());
        let record = match builder.build(&detail, time) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(%href, title = %detail.title, "excluded title; skipping");
                report.excluded += 1;
                continue;
            }
            Err(err) => {
                warn!(%href, error = %err, "event could not be built; skipping");
                report.failed += 1;
                continue;
            }
        };
        report.records_built += 1;

        let date = record.start.date_naive();
        let category = record.category.clone();
        let title = record.title.clone();
        if collector.accept(record) {
            report.accepted += 1;
            info!(%date, %category, %title, "event accepted");
        } else {
            report.duplicates += 1;
            debug!(%href, %title, "duplicate title; skipping");
        }
    }

    let generator = RecurringScheduleGenerator::new(config.timezone()?);
    for spec in &config.recurring {
        let records = generator
            .generate(year, month, spec)
            .with_context(|| format!("failed to schedule {:?}", spec.title))?;
        info!(
            title = %spec.title,
            year,
            month,
            events = records.len(),
            "recurring slots generated"
        );
        report.recurring += records.len();
        collector.append(records);
    }

    Ok(collector)
}

pub fn validate_config(path: Option<&Path>) -> Result<Vec<String>> {
    let loaded = load_config(path)?;
    let mut messages = Vec::new();
    let origin = match &loaded.path {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    };
    messages.push(format!("OK: {origin}"));
    messages.push(format!("listing: {}", loaded.config.listing_url()?));
    messages.push(format!("timezone: {}", loaded.config.site.timezone));
    for spec in &loaded.config.recurring {
        messages.push(format!(
            "recurring: {} every {} {} ({} min)",
            spec.title, spec.weekday, spec.start, spec.duration_minutes
        ));
    }
    for rule in &loaded.config.event.overrides {
        messages.push(format!(
            "override: {:?} at {} ({} min)",
            rule.title_contains, rule.start, rule.duration_minutes
        ));
    }
    Ok(messages)
}

pub fn inspect_calendar(options: &InspectOptions) -> Result<InspectReport> {
    let path = match &options.path {
        Some(path) => path.clone(),
        None => {
            let loaded: LoadedConfig = load_config(options.config_path.as_deref())?;
            loaded.resolve(&loaded.config.output.path)
        }
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read calendar {}", path.display()))?;
    let document = read_calendar(&text);

    let mut copies: BTreeMap<(Option<DateTime<Utc>>, String), usize> = BTreeMap::new();
    for event in &document.events {
        *copies.entry((event.start, event.summary.clone())).or_default() += 1;
    }
    let distinct_events = copies.len();
    let repeated_events = copies
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((start, title), count)| RepeatedEvent {
            title,
            start,
            copies: count,
        })
        .collect();

    Ok(InspectReport {
        path,
        calendars: document.calendars,
        events: document.events.len(),
        distinct_events,
        repeated_events,
    })
}
