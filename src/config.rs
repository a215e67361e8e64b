use crate::model::{RecurringScheduleSpec, TimeOfDay, TitleOverride};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Weekday;
use chrono_tz::Tz;
use scraper::Selector;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://cynhn.com";
pub const DEFAULT_LISTING_PATH: &str = "/calendar";
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";
pub const DEFAULT_EVENT_DURATION_MINUTES: u32 = 150;
pub const DEFAULT_PRODID: &str = "-//nao_y//CYNHN Unofficial Calendar//JP";
pub const DEFAULT_OUTPUT_PATH: &str = "CYNHN_Unofficial_Calendar.ics";

const RADIO_TITLE: &str =
    "FM-FUJI「GIRLS♥GIRLS♥GIRLS =flying high= CYNHNの歌いまスウィーニー」";
const RADIO_URL: &str = "https://cynhn.com/contents/289980";
const RADIO_DESCRIPTION: &str = "毎週木曜 23:30～24:00（2018年4月5日より）\n\
出演：CYNHN（スウィーニー）\n\
▼メッセージ受付はこちら！\n\
cynhn@fmfuji.jp";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// `None` when running on built-in defaults.
    pub path: Option<PathBuf>,
    pub config: CalendarConfig,
}

impl LoadedConfig {
    pub fn resolve(&self, maybe_relative: &Path) -> PathBuf {
        match &self.path {
            Some(path) => resolve_path(path, maybe_relative),
            None => maybe_relative.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub detail: DetailConfig,
    #[serde(default)]
    pub event: EventConfig,
    #[serde(default = "default_recurring")]
    pub recurring: Vec<RecurringScheduleSpec>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            fetch: FetchConfig::default(),
            listing: ListingConfig::default(),
            detail: DetailConfig::default(),
            event: EventConfig::default(),
            recurring: default_recurring(),
            output: OutputConfig::default(),
        }
    }
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.timezone()?;

        if self.site.listing_path.trim().is_empty() {
            bail!("site.listing_path must not be empty");
        }

        if self.fetch.mode == FetchMode::File && self.fetch.root_dir.is_none() {
            bail!("fetch.root_dir is required for file mode");
        }

        for selector in [
            &self.listing.link_selector,
            &self.detail.title_selector,
            &self.detail.category_selector,
            &self.detail.date_selector,
            &self.detail.body_selector,
            &self.detail.paragraph_selector,
        ] {
            parse_selector(selector)?;
        }

        if self.event.default_duration_minutes == 0 {
            bail!("event.default_duration_minutes must be positive");
        }
        for rule in &self.event.overrides {
            if rule.title_contains.is_empty() {
                bail!("event.overrides entries need a non-empty title_contains");
            }
            if rule.duration_minutes == 0 {
                bail!(
                    "override for {:?} must have a positive duration",
                    rule.title_contains
                );
            }
        }

        for spec in &self.recurring {
            if spec.title.trim().is_empty() {
                bail!("recurring entries need a title");
            }
            if spec.duration_minutes == 0 {
                bail!("recurring entry {:?} must have a positive duration", spec.title);
            }
        }

        if self.output.prodid.trim().is_empty() {
            bail!("output.prodid must not be empty");
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.site.base_url)
            .with_context(|| format!("invalid site.base_url {}", self.site.base_url))
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.site
            .timezone
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid site.timezone {}: {err}", self.site.timezone))
    }

    pub fn listing_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        base.join(&self.site.listing_path)
            .with_context(|| format!("invalid site.listing_path {}", self.site.listing_path))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_listing_path")]
    pub listing_path: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            listing_path: default_listing_path(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub mode: FetchMode,
    /// Mirror of the site for `file` mode.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    /// Pre-rendered listing page; takes precedence over fetching the listing.
    #[serde(default)]
    pub listing_file: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u8,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Http,
            root_dir: None,
            listing_file: None,
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default = "default_ignored_hrefs")]
    pub ignored_hrefs: Vec<String>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            link_selector: default_link_selector(),
            ignored_hrefs: default_ignored_hrefs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    #[serde(default = "default_category_selector")]
    pub category_selector: String,
    #[serde(default = "default_date_selector")]
    pub date_selector: String,
    #[serde(default = "default_body_selector")]
    pub body_selector: String,
    #[serde(default = "default_paragraph_selector")]
    pub paragraph_selector: String,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            title_selector: default_title_selector(),
            category_selector: default_category_selector(),
            date_selector: default_date_selector(),
            body_selector: default_body_selector(),
            paragraph_selector: default_paragraph_selector(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_event_duration")]
    pub default_duration_minutes: u32,
    #[serde(default = "default_excluded_markers")]
    pub excluded_title_markers: Vec<String>,
    #[serde(default = "default_overrides")]
    pub overrides: Vec<TitleOverride>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: default_event_duration(),
            excluded_title_markers: default_excluded_markers(),
            overrides: default_overrides(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default = "default_prodid")]
    pub prodid: String,
    #[serde(default)]
    pub calendar_name: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            prodid: default_prodid(),
            calendar_name: None,
        }
    }
}

/// Loads and validates `path`, or the built-in defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = path else {
        let config = CalendarConfig::default();
        config.validate().context("invalid built-in configuration")?;
        return Ok(LoadedConfig { path: None, config });
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config = parse_config(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(LoadedConfig {
        path: Some(path.to_path_buf()),
        config,
    })
}

pub fn parse_config(text: &str) -> Result<CalendarConfig> {
    let config: CalendarConfig = toml::from_str(text).context("failed to parse toml")?;
    config.validate()?;
    Ok(config)
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow!("invalid selector {selector}: {err:?}"))
}

pub fn resolve_path(base_config_path: &Path, maybe_relative: &Path) -> PathBuf {
    if maybe_relative.is_absolute() {
        return maybe_relative.to_path_buf();
    }

    match base_config_path.parent() {
        Some(parent) => parent.join(maybe_relative),
        None => maybe_relative.to_path_buf(),
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_listing_path() -> String {
    DEFAULT_LISTING_PATH.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_retry_attempts() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_link_selector() -> String {
    "div.details.corner-details a".to_string()
}

fn default_ignored_hrefs() -> Vec<String> {
    vec!["/vertical_calendar".to_string()]
}

fn default_title_selector() -> String {
    "h2.title".to_string()
}

fn default_category_selector() -> String {
    "p.tag".to_string()
}

fn default_date_selector() -> String {
    "p.date".to_string()
}

fn default_body_selector() -> String {
    "div.body".to_string()
}

fn default_paragraph_selector() -> String {
    "p".to_string()
}

fn default_event_duration() -> u32 {
    DEFAULT_EVENT_DURATION_MINUTES
}

fn default_excluded_markers() -> Vec<String> {
    vec!["FM-FUJI".to_string()]
}

fn default_overrides() -> Vec<TitleOverride> {
    vec![TitleOverride {
        title_contains: "綾瀬志希展〜脳〜".to_string(),
        start: TimeOfDay::new(12, 0).unwrap_or_default(),
        duration_minutes: 6 * 60,
    }]
}

fn default_recurring() -> Vec<RecurringScheduleSpec> {
    vec![RecurringScheduleSpec {
        weekday: Weekday::Thu,
        start: TimeOfDay::new(23, 30).unwrap_or_default(),
        duration_minutes: 30,
        title: RADIO_TITLE.to_string(),
        category: "MEDIA".to_string(),
        description: RADIO_DESCRIPTION.to_string(),
        url: Some(RADIO_URL.to_string()),
    }]
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

fn default_prodid() -> String {
    DEFAULT_PRODID.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults_are_valid() {
        let loaded = load_config(None).unwrap();
        let config = loaded.config;
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(config.listing_url().unwrap().as_str(), "https://cynhn.com/calendar");
        assert_eq!(config.event.default_duration_minutes, 150);
        assert_eq!(config.recurring.len(), 1);
        assert_eq!(config.recurring[0].weekday, Weekday::Thu);
        assert_eq!(config.recurring[0].start.to_string(), "23:30");
    }

    #[test]
    fn empty_toml_falls_back_to_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.site.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.recurring.len(), 1);
        assert_eq!(config.event.overrides.len(), 1);
    }

    #[test]
    fn toml_overrides_sections() {
        let config = parse_config(
            r#"
            [site]
            timezone = "Asia/Seoul"

            [fetch]
            mode = "file"
            root_dir = "mirror"

            [event]
            default_duration_minutes = 90
            excluded_title_markers = ["RADIO"]

            [[event.overrides]]
            title_contains = "EXPO"
            start = "10:00"
            duration_minutes = 480

            [[recurring]]
            weekday = "Mon"
            start = "21:00"
            duration_minutes = 60
            title = "Weekly stream"
            category = "STREAM"
            "#,
        )
        .unwrap();

        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Seoul);
        assert_eq!(config.fetch.mode, FetchMode::File);
        assert_eq!(config.event.default_duration_minutes, 90);
        assert_eq!(config.event.overrides[0].start.to_string(), "10:00");
        assert_eq!(config.recurring.len(), 1);
        assert_eq!(config.recurring[0].weekday, Weekday::Mon);
        assert!(config.recurring[0].description.is_empty());
    }

    #[test]
    fn shipped_sample_matches_defaults() {
        let sample = parse_config(include_str!("../configs/cynhn.toml")).unwrap();
        let defaults = CalendarConfig::default();
        assert_eq!(sample.recurring, defaults.recurring);
        assert_eq!(sample.event.overrides, defaults.event.overrides);
        assert_eq!(sample.output.prodid, defaults.output.prodid);
        assert_eq!(sample.listing.link_selector, defaults.listing.link_selector);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_config("[site]\ntimezone = \"Mars/Olympus\"").is_err());
        assert!(parse_config("[event]\ndefault_duration_minutes = 0").is_err());
        assert!(parse_config("[fetch]\nmode = \"file\"").is_err());
        assert!(parse_config("[listing]\nlink_selector = \"div[\"").is_err());
        assert!(parse_config("[[recurring]]\nweekday = \"Thu\"\nstart = \"25:00\"\nduration_minutes = 30\ntitle = \"x\"\ncategory = \"y\"").is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let resolved = resolve_path(Path::new("/etc/cynhn/config.toml"), Path::new("out.ics"));
        assert_eq!(resolved, PathBuf::from("/etc/cynhn/out.ics"));
        let absolute = resolve_path(Path::new("/etc/cynhn/config.toml"), Path::new("/tmp/a.ics"));
        assert_eq!(absolute, PathBuf::from("/tmp/a.ics"));
    }
}
