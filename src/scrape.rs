use crate::config::{DetailConfig, ListingConfig, parse_selector};
use crate::model::RawDetailPage;
use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

/// Detail-page hrefs linked from the listing, in document order.
///
/// Repeats are kept: a multi-day event is linked once per day and the
/// collector drops the extra copies by title.
pub fn extract_detail_hrefs(html: &str, listing: &ListingConfig) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(&listing.link_selector)?;

    let hrefs = document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .filter(|href| !listing.ignored_hrefs.iter().any(|ignored| ignored.as_str() == *href))
        .map(ToString::to_string)
        .collect();

    Ok(hrefs)
}

/// Compiled selectors for the detail page layout.
pub struct DetailSelectors {
    title: Selector,
    category: Selector,
    date: Selector,
    body: Selector,
    paragraph: Selector,
}

impl DetailSelectors {
    pub fn from_config(config: &DetailConfig) -> Result<Self> {
        Ok(Self {
            title: parse_selector(&config.title_selector)?,
            category: parse_selector(&config.category_selector)?,
            date: parse_selector(&config.date_selector)?,
            body: parse_selector(&config.body_selector)?,
            paragraph: parse_selector(&config.paragraph_selector)?,
        })
    }

    pub fn parse_detail_page(&self, href: &str, html: &str) -> Result<RawDetailPage> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let title = required_text(&root, &self.title, "title", href)?;
        let category = required_text(&root, &self.category, "category", href)?;
        let date_text = required_text(&root, &self.date, "date", href)?;

        let body_paragraphs = match root.select(&self.body).next() {
            Some(body) => body
                .select(&self.paragraph)
                .map(|p| element_text(&p))
                .collect(),
            None => Vec::new(),
        };

        Ok(RawDetailPage {
            href: href.to_string(),
            title,
            category,
            date_text,
            body_paragraphs,
        })
    }
}

fn required_text(root: &ElementRef<'_>, selector: &Selector, field: &str, href: &str) -> Result<String> {
    root.select(selector)
        .next()
        .map(|element| normalize_whitespace(&element_text(&element)))
        .ok_or_else(|| anyhow!("detail page {href} has no {field} node"))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="details corner-details">
            <a href="/vertical_calendar">縦表示</a>
            <a href="/contents/101">LIVE</a>
            <a href="/contents/102">EVENT</a>
            <a href="/contents/101">LIVE</a>
            <a>no href</a>
          </div>
          <div class="other"><a href="/contents/999">elsewhere</a></div>
        </body></html>
    "#;

    const DETAIL: &str = r#"
        <html><body>
          <h2 class="title">
            CYNHN ワンマンライブ
            「Blue Cresc.」
          </h2>
          <p class="tag">LIVE</p>
          <p class="date">2024.03.09 (SAT)</p>
          <div class="body">
            <p>開場18:00/開演18:30</p>
            <p>会場：<span>Spotify O-WEST</span></p>
          </div>
          <p>footer text</p>
        </body></html>
    "#;

    #[test]
    fn listing_links_keep_order_and_repeats() {
        let hrefs = extract_detail_hrefs(LISTING, &ListingConfig::default()).unwrap();
        assert_eq!(hrefs, vec!["/contents/101", "/contents/102", "/contents/101"]);
    }

    #[test]
    fn detail_page_fields_are_extracted() {
        let selectors = DetailSelectors::from_config(&DetailConfig::default()).unwrap();
        let page = selectors.parse_detail_page("/contents/101", DETAIL).unwrap();
        assert_eq!(page.href, "/contents/101");
        assert_eq!(page.title, "CYNHN ワンマンライブ 「Blue Cresc.」");
        assert_eq!(page.category, "LIVE");
        assert_eq!(page.date_text, "2024.03.09 (SAT)");
        assert_eq!(
            page.body_paragraphs,
            vec!["開場18:00/開演18:30".to_string(), "会場：Spotify O-WEST".to_string()]
        );
    }

    #[test]
    fn missing_title_is_an_error() {
        let selectors = DetailSelectors::from_config(&DetailConfig::default()).unwrap();
        let err = selectors
            .parse_detail_page("/contents/1", "<html><body><p class=\"date\">2024.01.01</p></body></html>")
            .unwrap_err();
        assert!(err.to_string().contains("no title node"));
    }

    #[test]
    fn missing_body_yields_no_paragraphs() {
        let selectors = DetailSelectors::from_config(&DetailConfig::default()).unwrap();
        let html = r#"<h2 class="title">T</h2><p class="tag">NEWS</p><p class="date">2024.01.01</p>"#;
        let page = selectors.parse_detail_page("/contents/1", html).unwrap();
        assert!(page.body_paragraphs.is_empty());
    }
}
