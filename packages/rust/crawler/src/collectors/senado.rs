//! Senado Federal news listing.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::Html;
use url::Url;

use clipping_shared::{ClippingError, RawItem, Result};

use super::{ListingSite, anchors, element_text, extract_date, parent_text, resolve_link};

const LISTING_PATH: &str = "/noticias/ultimas";
const MIN_TITLE_CHARS: usize = 15;
const MAX_ITEMS_PER_PAGE: usize = 15;

/// Article URLs are filed by date: `/noticias/materias/2025/03/05/slug`.
static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/noticias/materias/\d{4}/").expect("valid regex"));

/// `https://www12.senado.leg.br/noticias/ultimas/N`
pub struct SenadoSite;

impl ListingSite for SenadoSite {
    fn code(&self) -> &'static str {
        "senado_federal"
    }

    fn default_base(&self) -> &'static str {
        "https://www12.senado.leg.br"
    }

    fn page_url(&self, base: &Url, page: u32) -> Result<Url> {
        let path = if page > 1 {
            format!("{LISTING_PATH}/{page}")
        } else {
            LISTING_PATH.to_string()
        };
        base.join(&path)
            .map_err(|e| ClippingError::url(path.as_str(), e))
    }

    fn parse_listing(&self, doc: &Html, base: &Url, collected_at: DateTime<Utc>) -> Vec<RawItem> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for (a, href) in anchors(doc) {
            if !ARTICLE_RE.is_match(href) {
                continue;
            }
            let title = element_text(&a);
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }
            let Some(link) = resolve_link(base, href) else {
                continue;
            };
            if !seen.insert(link.clone()) {
                continue;
            }

            items.push(RawItem {
                title,
                link,
                summary: String::new(),
                source: self.code().to_string(),
                collected_at,
                published_at: parent_text(&a).and_then(|text| extract_date(&text)),
            });

            if items.len() >= MAX_ITEMS_PER_PAGE {
                break;
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::collectors::tests::quick_settings;
    use crate::collectors::{ListingCollector, SourceCollector};

    fn listing(ids: std::ops::Range<u32>) -> String {
        let rows: String = ids
            .map(|i| {
                format!(
                    r#"<div class="item"><a href="/noticias/materias/2025/03/05/materia-numero-{i}">Senado aprova projeto número {i} sobre crédito</a> <span>05/03/2025 10h00</span></div>"#
                )
            })
            .collect();
        let short = "<a href='/noticias/materias/2025/03/05/x'>Curto</a>";
        format!("<html><body>{rows}{short}</body></html>")
    }

    #[test]
    fn caps_items_per_page() {
        let doc = Html::parse_document(&listing(0..20));
        let base = Url::parse("https://www12.senado.leg.br").unwrap();
        let items = SenadoSite.parse_listing(&doc, &base, Utc::now());

        assert_eq!(items.len(), MAX_ITEMS_PER_PAGE);
        assert_eq!(items[0].published_at.unwrap().day(), 5);
        assert!(items.iter().all(|i| i.source == "senado_federal"));
    }

    #[test]
    fn page_urls_use_path_segments() {
        let base = Url::parse("https://www12.senado.leg.br").unwrap();
        assert_eq!(
            SenadoSite.page_url(&base, 2).unwrap().as_str(),
            "https://www12.senado.leg.br/noticias/ultimas/2"
        );
    }

    #[tokio::test]
    async fn collects_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/noticias/ultimas"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(0..3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/noticias/ultimas/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(2..5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/noticias/ultimas/3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let collector =
            ListingCollector::with_base_url(SenadoSite, &server.uri(), quick_settings()).unwrap();
        let items = collector.collect(3).await.unwrap();
        assert_eq!(items.len(), 5);
    }
}
