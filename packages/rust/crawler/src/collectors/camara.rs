//! Câmara dos Deputados news listing.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::Html;
use url::Url;

use clipping_shared::{ClippingError, RawItem, Result};

use super::{ListingSite, anchors, element_text, extract_date, parent_text, resolve_link};

const LISTING_PATH: &str = "/noticias/ultimas";
const MIN_TITLE_CHARS: usize = 20;
const MAX_ITEMS_PER_PAGE: usize = 20;

/// Article URLs carry a seven-digit id: `/noticias/1234567-slug`.
static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/noticias/\d{7}-").expect("valid regex"));

/// `https://www.camara.leg.br/noticias/ultimas?pagina=N`
pub struct CamaraSite;

impl ListingSite for CamaraSite {
    fn code(&self) -> &'static str {
        "camara_dos_deputados"
    }

    fn default_base(&self) -> &'static str {
        "https://www.camara.leg.br"
    }

    fn page_url(&self, base: &Url, page: u32) -> Result<Url> {
        let mut url = base
            .join(LISTING_PATH)
            .map_err(|e| ClippingError::url(LISTING_PATH, e))?;
        if page > 1 {
            url.query_pairs_mut().append_pair("pagina", &page.to_string());
        }
        Ok(url)
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
