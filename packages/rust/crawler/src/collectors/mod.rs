//! Source collector trait and the built-in listing-page collectors.
//!
//! Every built-in source publishes a paginated listing of headlines. A
//! [`ListingSite`] knows how one site paginates and how to read items off a
//! listing page; [`ListingCollector`] drives the page loop, the HTTP session
//! and the politeness delay for any site.

mod agencia_gov;
mod camara;
mod senado;

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use clipping_shared::{ClippingError, CollectionConfig, RawItem, Result};

use crate::http::{HttpSession, HttpSettings};

pub use agencia_gov::AgenciaGovSite;
pub use camara::CamaraSite;
pub use senado::SenadoSite;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A source of raw news items.
#[async_trait]
pub trait SourceCollector: Send + Sync {
    /// Stable source code stored with every item, e.g. `senado_federal`.
    fn code(&self) -> &str;

    /// Collect items from up to `max_pages` listing pages.
    async fn collect(&self, max_pages: u32) -> Result<Vec<RawItem>>;

    /// Release network resources held by the collector.
    fn close(&self) {}
}

/// Site-specific knowledge used by [`ListingCollector`].
pub trait ListingSite: Send + Sync {
    fn code(&self) -> &'static str;

    /// Production base URL.
    fn default_base(&self) -> &'static str;

    /// URL of listing page `page` (1-based).
    fn page_url(&self, base: &Url, page: u32) -> Result<Url>;

    /// Read the items of one listing page.
    fn parse_listing(&self, doc: &Html, base: &Url, collected_at: DateTime<Utc>) -> Vec<RawItem>;

    /// Hard limit on pages regardless of the requested count.
    fn page_cap(&self) -> Option<u32> {
        None
    }
}

// ---------------------------------------------------------------------------
// Listing collector
// ---------------------------------------------------------------------------

/// Paginated listing collector for one [`ListingSite`].
pub struct ListingCollector<S> {
    site: S,
    base: Url,
    session: HttpSession,
}

impl<S: ListingSite> ListingCollector<S> {
    /// Collector pointed at the site's production URL.
    pub fn new(site: S, settings: HttpSettings) -> Result<Self> {
        let base = site.default_base();
        Self::with_base_url(site, base, settings)
    }

    /// Collector pointed at another base URL (mirrors, tests).
    pub fn with_base_url(site: S, base: &str, settings: HttpSettings) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| ClippingError::url(base, e))?;
        Ok(Self {
            site,
            base,
            session: HttpSession::new(settings),
        })
    }
}

#[async_trait]
impl<S: ListingSite> SourceCollector for ListingCollector<S> {
    fn code(&self) -> &str {
        self.site.code()
    }

    /// Pages that fail to load are logged and skipped. An error is returned
    /// only when no page could be loaded at all.
    #[instrument(skip_all, fields(source = self.site.code(), max_pages))]
    async fn collect(&self, max_pages: u32) -> Result<Vec<RawItem>> {
        let start = Instant::now();
        let last_page = self
            .site
            .page_cap()
            .map_or(max_pages, |cap| cap.min(max_pages));

        let mut items: Vec<RawItem> = Vec::new();
        let mut seen = HashSet::new();
        let mut pages_loaded = 0u32;
        let mut last_error = None;

        for page in 1..=last_page {
            let url = self.site.page_url(&self.base, page)?;
            let body = match self.session.get_html(url.as_str()).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(page, error = %e, "listing page failed, skipping");
                    last_error = Some(e);
                    continue;
                }
            };
            pages_loaded += 1;

            let page_items = {
                let doc = Html::parse_document(&body);
                self.site.parse_listing(&doc, &self.base, Utc::now())
            };
            let found = page_items.len();
            debug!(page, found, "listing page parsed");

            items.extend(
                page_items
                    .into_iter()
                    .filter(|item| seen.insert(item.link.clone())),
            );

            if found == 0 && page > 1 {
                break;
            }
        }

        if pages_loaded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        info!(
            items = items.len(),
            pages_loaded,
            elapsed_ms = start.elapsed().as_millis(),
            "source collected"
        );
        Ok(items)
    }

    fn close(&self) {
        self.session.close();
    }
}

/// The three built-in collectors, configured from `config`.
pub fn default_collectors(config: &CollectionConfig) -> Result<Vec<Box<dyn SourceCollector>>> {
    let settings = HttpSettings::from(config);
    Ok(vec![
        Box::new(ListingCollector::new(CamaraSite, settings.clone())?),
        Box::new(ListingCollector::new(SenadoSite, settings.clone())?),
        Box::new(ListingCollector::new(AgenciaGovSite, settings)?),
    ])
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s+(\d{2})[:h](\d{2})").expect("valid regex")
});

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").expect("valid regex"));

/// Listing dates are Brasília time (UTC−3, no daylight saving).
pub(crate) fn brasilia() -> Option<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
}

/// Every anchor with its `href`.
pub(crate) fn anchors(doc: &Html) -> impl Iterator<Item = (ElementRef<'_>, &str)> {
    doc.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href").map(|href| (a, href)))
}

/// Collapse all whitespace runs to single spaces.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, whitespace-collapsed.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Resolve `href` against `base`, dropping any fragment.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Text of the anchor's parent element, where listings put the date line.
pub(crate) fn parent_text(el: &ElementRef<'_>) -> Option<String> {
    el.parent()
        .and_then(ElementRef::wrap)
        .map(|parent| element_text(&parent))
}

/// Find a `dd/mm/yyyy hh:mm`, `dd/mm/yyyy hhhmm` or `dd/mm/yyyy` date in
/// free text and convert it from Brasília time to UTC.
pub(crate) fn extract_date(text: &str) -> Option<DateTime<Utc>> {
    let number = |caps: &regex::Captures<'_>, i: usize| caps.get(i)?.as_str().parse::<u32>().ok();

    let with_time = DATE_TIME_RE.captures(text).and_then(|caps| {
        let date = NaiveDate::from_ymd_opt(
            number(&caps, 3)? as i32,
            number(&caps, 2)?,
            number(&caps, 1)?,
        )?;
        let time = NaiveTime::from_hms_opt(number(&caps, 4)?, number(&caps, 5)?, 0)?;
        Some(date.and_time(time))
    });

    let naive = with_time.or_else(|| {
        let caps = DATE_RE.captures(text)?;
        NaiveDate::from_ymd_opt(
            number(&caps, 3)? as i32,
            number(&caps, 2)?,
            number(&caps, 1)?,
        )?
        .and_hms_opt(0, 0, 0)
    })?;

    brasilia()?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Text of the first `<p>` inside `el` or after it among its siblings.
pub(crate) fn following_paragraph(el: &ElementRef<'_>) -> Option<String> {
    fn first_paragraph(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
        if el.value().name() == "p" {
            return Some(el);
        }
        el.descendants()
            .filter_map(ElementRef::wrap)
            .find(|d| d.value().name() == "p")
    }

    first_paragraph(*el)
        .or_else(|| {
            el.next_siblings()
                .filter_map(ElementRef::wrap)
                .find_map(first_paragraph)
        })
        .map(|p| element_text(&p))
}

/// Truncate to at most `max` characters.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Datelike, Timelike};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::Politeness;

    pub(crate) fn quick_settings() -> HttpSettings {
        HttpSettings {
            user_agent: "clipping-test".into(),
            timeout: Duration::from_secs(5),
            politeness: Politeness::none(),
        }
    }

    #[test]
    fn extracts_dates_in_listing_formats() {
        let dt = extract_date("Publicado em 05/03/2025 14:30 - Plenário").unwrap();
        assert_eq!((dt.day(), dt.month(), dt.year()), (5, 3, 2025));
        assert_eq!((dt.hour(), dt.minute()), (17, 30));

        let dt = extract_date("05/03/2025 09h15").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (12, 15));

        let dt = extract_date("Atualizado 31/12/2024").unwrap();
        assert_eq!((dt.day(), dt.hour()), (31, 3));

        assert!(extract_date("sem data").is_none());
        assert!(extract_date("32/13/2025").is_none());
    }

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("https://www.camara.leg.br").unwrap();
        assert_eq!(
            resolve_link(&base, "/noticias/1234567-x#top").as_deref(),
            Some("https://www.camara.leg.br/noticias/1234567-x")
        );
        assert_eq!(
            resolve_link(&base, "https://outro.gov.br/a").as_deref(),
            Some("https://outro.gov.br/a")
        );
    }

    #[test]
    fn finds_following_paragraph() {
        let doc = Html::parse_document(
            "<div><h3><a href='/x'>T</a></h3><p>  Resumo   da notícia </p></div>",
        );
        let (a, _) = anchors(&doc).next().unwrap();
        let parent = a.parent().and_then(ElementRef::wrap).unwrap();
        assert_eq!(following_paragraph(&parent).as_deref(), Some("Resumo da notícia"));
    }

    struct FlakySite;

    impl ListingSite for FlakySite {
        fn code(&self) -> &'static str {
            "flaky"
        }
        fn default_base(&self) -> &'static str {
            "http://localhost"
        }
        fn page_url(&self, base: &Url, page: u32) -> Result<Url> {
            base.join(&format!("/list/{page}"))
                .map_err(|e| ClippingError::url(format!("/list/{page}"), e))
        }
        fn parse_listing(
            &self,
            doc: &Html,
            base: &Url,
            collected_at: DateTime<Utc>,
        ) -> Vec<RawItem> {
            anchors(doc)
                .filter_map(|(a, href)| {
                    Some(RawItem {
                        title: element_text(&a),
                        link: resolve_link(base, href)?,
                        summary: String::new(),
                        source: "flaky".into(),
                        collected_at,
                        published_at: None,
                    })
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn failed_pages_are_skipped_and_duplicates_dropped() {
        let server = MockServer::start().await;
        let listing = "<a href='/n/1'>Um</a><a href='/n/2'>Dois</a>";
        Mock::given(method("GET"))
            .and(path("/list/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;

        let collector =
            ListingCollector::with_base_url(FlakySite, &server.uri(), quick_settings()).unwrap();
        let items = collector.collect(3).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(collector.code(), "flaky");
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let result = ListingCollector::with_base_url(FlakySite, "not a url", quick_settings());
        let Err(err) = result else {
            panic!("malformed base URL accepted");
        };
        assert!(matches!(err, ClippingError::Url { .. }));
    }

    #[tokio::test]
    async fn all_pages_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let collector =
            ListingCollector::with_base_url(FlakySite, &server.uri(), quick_settings()).unwrap();
        let err = collector.collect(2).await.unwrap_err();
        assert!(matches!(err, ClippingError::Network { .. }));
    }

    #[tokio::test]
    async fn empty_later_page_stops_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a href='/n/1'>Um</a>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>fim</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list/3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a href='/n/3'>Três</a>"))
            .expect(0)
            .mount(&server)
            .await;

        let collector =
            ListingCollector::with_base_url(FlakySite, &server.uri(), quick_settings()).unwrap();
        let items = collector.collect(5).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn default_collectors_cover_three_sources() {
        let collectors = default_collectors(&CollectionConfig::default()).unwrap();
        let codes: Vec<_> = collectors.iter().map(|c| c.code().to_string()).collect();
        assert_eq!(codes, vec!["camara_dos_deputados", "senado_federal", "agencia_gov"]);
    }
}
