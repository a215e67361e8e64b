use crate::config::{FetchMode, LoadedConfig};
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub source_url: String,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Where listing and detail pages come from.
pub trait PageSource {
    fn listing(&self) -> Result<FetchedPage>;
    fn page(&self, href: &str) -> Result<FetchedPage>;
}

pub fn open_page_source(loaded: &LoadedConfig) -> Result<Box<dyn PageSource>> {
    let config = &loaded.config;
    let listing_file = config
        .fetch
        .listing_file
        .as_deref()
        .map(|path| loaded.resolve(path));

    match config.fetch.mode {
        FetchMode::Http => Ok(Box::new(HttpPageSource::new(loaded, listing_file)?)),
        FetchMode::File => {
            let root = config
                .fetch
                .root_dir
                .as_deref()
                .context("fetch.root_dir missing for file mode")?;
            Ok(Box::new(FilePageSource::new(
                loaded.resolve(root),
                config.site.listing_path.clone(),
                listing_file,
            )))
        }
    }
}

pub struct HttpPageSource {
    client: Client,
    base_url: Url,
    listing_url: Url,
    listing_file: Option<PathBuf>,
    retry_attempts: u8,
    retry_backoff_ms: u64,
}

impl HttpPageSource {
    pub fn new(loaded: &LoadedConfig, listing_file: Option<PathBuf>) -> Result<Self> {
        let config = &loaded.config;
        let mut headers = HeaderMap::new();
        if let Some(user_agent) = &config.fetch.user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            listing_url: config.listing_url()?,
            listing_file,
            retry_attempts: config.fetch.retry_attempts,
            retry_backoff_ms: config.fetch.retry_backoff_ms,
        })
    }

    fn get(&self, url: &Url) -> Result<FetchedPage> {
        let body = fetch_with_retries(
            &self.client,
            url.as_str(),
            self.retry_attempts,
            self.retry_backoff_ms,
        )?;
        debug!(url = %url, bytes = body.len(), "fetched page");
        Ok(FetchedPage {
            source_url: url.to_string(),
            body,
        })
    }
}

impl PageSource for HttpPageSource {
    fn listing(&self) -> Result<FetchedPage> {
        if let Some(path) = &self.listing_file {
            return read_local_page(path);
        }
        self.get(&self.listing_url)
    }

    fn page(&self, href: &str) -> Result<FetchedPage> {
        let url = self
            .base_url
            .join(href)
            .with_context(|| format!("invalid detail href {href}"))?;
        self.get(&url)
    }
}

fn fetch_with_retries(
    client: &Client,
    url: &str,
    retry_attempts: u8,
    retry_backoff_ms: u64,
) -> Result<Vec<u8>> {
    let attempts = retry_attempts.max(1);

    for attempt in 1..=attempts {
        match client.get(url).send() {
            Ok(resp) => {
                if !resp.status().is_success() {
                    let status = resp.status();
                    if attempt == attempts {
                        bail!("request to {url} failed with status {status}");
                    }
                    warn!(%url, %status, attempt, "request failed; retrying");
                } else {
                    return Ok(resp.bytes()?.to_vec());
                }
            }
            Err(err) => {
                if attempt == attempts {
                    return Err(err).with_context(|| format!("request to {url} failed"));
                }
                warn!(%url, attempt, error = %err, "request errored; retrying");
            }
        }

        std::thread::sleep(Duration::from_millis(retry_backoff_ms));
    }

    bail!("request to {url} failed after retries")
}

/// Serves a mirrored copy of the site: `/contents/42` is read from `<root>/contents/42.html`.
pub struct FilePageSource {
    root: PathBuf,
    listing_path: String,
    listing_file: Option<PathBuf>,
}

impl FilePageSource {
    pub fn new(root: PathBuf, listing_path: String, listing_file: Option<PathBuf>) -> Self {
        Self {
            root,
            listing_path,
            listing_file,
        }
    }

    pub fn path_for(&self, href: &str) -> PathBuf {
        let trimmed = href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_start_matches('/');
        let mut path = self.root.join(trimmed);
        if path.extension().is_none() {
            path.set_extension("html");
        }
        path
    }
}

impl PageSource for FilePageSource {
    fn listing(&self) -> Result<FetchedPage> {
        match &self.listing_file {
            Some(path) => read_local_page(path),
            None => read_local_page(&self.path_for(&self.listing_path)),
        }
    }

    fn page(&self, href: &str) -> Result<FetchedPage> {
        read_local_page(&self.path_for(href))
    }
}

fn read_local_page(path: &Path) -> Result<FetchedPage> {
    let body =
        std::fs::read(path).with_context(|| format!("failed to read page {}", path.display()))?;
    info!(file = %path.display(), bytes = body.len(), "loaded local page");
    Ok(FetchedPage {
        source_url: format!("file://{}", path.display()),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_maps_hrefs_to_html_files() {
        let source = FilePageSource::new(PathBuf::from("/mirror"), "/calendar".to_string(), None);
        assert_eq!(source.path_for("/contents/42"), PathBuf::from("/mirror/contents/42.html"));
        assert_eq!(source.path_for("contents/42?lang=ja"), PathBuf::from("/mirror/contents/42.html"));
        assert_eq!(source.path_for("/calendar"), PathBuf::from("/mirror/calendar.html"));
        assert_eq!(source.path_for("/static/page.htm"), PathBuf::from("/mirror/static/page.htm"));
    }

    #[test]
    fn file_source_reads_listing_override() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let listing = dir.path().join("rendered.html");
        std::fs::write(&listing, "<html>listing</html>")?;

        let source = FilePageSource::new(dir.path().to_path_buf(), "/calendar".to_string(), Some(listing));
        assert_eq!(source.listing()?.text(), "<html>listing</html>");
        assert!(source.page("/contents/missing").is_err());
        Ok(())
    }
}
