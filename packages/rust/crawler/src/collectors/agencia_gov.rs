//! Agência Gov (EBC) news listing.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use clipping_shared::{ClippingError, RawItem, Result};

use super::{
    ListingSite, anchors, brasilia, element_text, following_paragraph, resolve_link,
    truncate_chars,
};

const LISTING_PATH: &str = "/noticias";
const MIN_TITLE_CHARS: usize = 20;
const MAX_ITEMS_PER_PAGE: usize = 15;
const MAX_SUMMARY_CHARS: usize = 200;
const MAX_PAGES: u32 = 2;

/// Portal navigation links that match the article pattern but are not news.
const NAVIGATION_TITLES: &[&str] = &[
    "notícias gov",
    "canal gov",
    "rádio gov",
    "acessar",
    "distribuição",
    "conteúdo",
];

/// Article URLs are filed by month: `/noticias/202503/slug`.
static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/noticias/(\d{4})(\d{2})/").expect("valid regex"));

/// `https://agenciagov.ebc.com.br/noticias?page=N`
pub struct AgenciaGovSite;

impl AgenciaGovSite {
    /// Only the month is known from the URL; the item is dated to the first
    /// day of that month at midnight, Brasília time.
    fn month_from_link(href: &str) -> Option<DateTime<Utc>> {
        let caps = ARTICLE_RE.captures(href)?;
        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let month = caps.get(2)?.as_str().parse::<u32>().ok()?;
        let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
        brasilia()?
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn is_navigation(title: &str) -> bool {
        let lower = title.to_lowercase();
        NAVIGATION_TITLES.iter().any(|nav| lower.contains(nav))
    }
}

impl ListingSite for AgenciaGovSite {
    fn code(&self) -> &'static str {
        "agencia_gov"
    }

    fn default_base(&self) -> &'static str {
        "https://agenciagov.ebc.com.br"
    }

    fn page_url(&self, base: &Url, page: u32) -> Result<Url> {
        let mut url = base
            .join(LISTING_PATH)
            .map_err(|e| ClippingError::url(LISTING_PATH, e))?;
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
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
            if title.chars().count() < MIN_TITLE_CHARS || Self::is_navigation(&title) {
                continue;
            }
            let Some(link) = resolve_link(base, href) else {
                continue;
            };
            if !seen.insert(link.clone()) {
                continue;
            }

            let summary = a
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|parent| following_paragraph(&parent))
                .map(|text| truncate_chars(&text, MAX_SUMMARY_CHARS))
                .unwrap_or_default();

            items.push(RawItem {
                title,
                link,
                summary,
                source: self.code().to_string(),
                collected_at,
                published_at: Self::month_from_link(href),
            });

            if items.len() >= MAX_ITEMS_PER_PAGE {
                break;
            }
        }

        items
    }

    fn page_cap(&self) -> Option<u32> {
        Some(MAX_PAGES)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::collectors::tests::quick_settings;
    use crate::collectors::{ListingCollector, SourceCollector};

    fn long_summary() -> String {
        "Texto do resumo ".repeat(30)
    }

    fn listing() -> String {
        format!(
            r#"
<html><body>
  <nav><a href="/noticias/202503/noticias-gov">Notícias Gov - acesse o portal completo</a></nav>
  <div class="card">
    <h3><a href="/noticias/202503/governo-anuncia-plano-de-safra">Governo anuncia plano de safra para 2025</a></h3>
    <p>{}</p>
  </div>
  <div class="card">
    <h3><a href="/noticias/202502/ministerio-publica-portaria">Ministério publica portaria sobre saneamento</a></h3>
  </div>
  <div class="card"><h3><a href="/noticias/202503/curta">Curta</a></h3></div>
  <a href="/sobre">Sobre a Agência Gov e seus canais</a>
</body></html>"#,
            long_summary()
        )
    }

    #[test]
    fn parses_cards_with_summaries() {
        let doc = Html::parse_document(&listing());
        let base = Url::parse("https://agenciagov.ebc.com.br").unwrap();
        let items = AgenciaGovSite.parse_listing(&doc, &base, Utc::now());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Governo anuncia plano de safra para 2025");
        assert_eq!(items[0].summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(items[1].summary.is_empty());
        assert_eq!(items[1].source, "agencia_gov");
    }

    #[test]
    fn dates_come_from_url_month() {
        let dt = AgenciaGovSite::month_from_link("/noticias/202503/qualquer").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2025, 3, 1, 3));
        assert!(AgenciaGovSite::month_from_link("/noticias/202513/x").is_none());
        assert!(AgenciaGovSite::month_from_link("/sobre").is_none());
    }

    #[test]
    fn navigation_titles_are_filtered() {
        assert!(AgenciaGovSite::is_navigation("Rádio Gov ao vivo agora"));
        assert!(AgenciaGovSite::is_navigation("ACESSAR o conteúdo"));
        assert!(!AgenciaGovSite::is_navigation("Governo anuncia plano de safra"));
    }

    #[tokio::test]
    async fn never_fetches_past_page_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/noticias"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/noticias"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing()))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/noticias"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing()))
            .mount(&server)
            .await;

        let collector =
            ListingCollector::with_base_url(AgenciaGovSite, &server.uri(), quick_settings())
                .unwrap();
        let items = collector.collect(5).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
