//! Article body extraction.
//!
//! [`extract_from_html`] strips page chrome, then tries a ladder of content
//! selectors used by Brazilian news portals before falling back to every
//! substantial paragraph on the page.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use clipping_shared::{CollectionConfig, ContentResult, Result};

use crate::collectors::collapse_whitespace;
use crate::http::{HttpSession, HttpSettings, Politeness};

/// Fetches an article and returns its cleaned body text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// `Err` means the page could not be fetched. A page that loads but has
    /// no usable text is `Ok` with `success == false`.
    async fn extract(&self, url: &str) -> Result<ContentResult>;

    fn close(&self) {}
}

const MIN_TITLE_CHARS: usize = 10;
const MIN_BLOCK_CHARS: usize = 150;
const MIN_PARAGRAPH_CHARS: usize = 30;
const MIN_CONTENT_CHARS: usize = 100;
const MIN_CONTENT_WORDS: u32 = 30;

const CHROME: &str = "script, style, nav, footer, header, .menu, .social, .comments, \
                      .sidebar, .advertisement, .ads, .publicity";

const TITLE_SELECTORS: &[&str] = &[
    "h1",
    ".titulo",
    ".entry-title",
    ".post-title",
    ".noticia-titulo",
    ".news-title",
    "title",
];

const CONTENT_SELECTORS: &[&str] = &[
    ".conteudo",
    ".entry-content",
    ".post-content",
    ".noticia-content",
    ".news-content",
    "article .content",
    "main article",
    "article",
    ".texto",
    "main",
];

/// Paragraphs containing any of these are footer or legal boilerplate.
const BOILERPLATE: &[&str] = &[
    "copyright",
    "política",
    "cookie",
    "termos de uso",
    "todos os direitos",
    "developed by",
    "powered by",
];

static CHROME_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CHROME).expect("valid selector"));

static TITLE_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    TITLE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static CONTENT_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));

/// Extract title and body text from an article page.
pub fn extract_from_html(html: &str) -> ContentResult {
    let mut doc = Html::parse_document(html);
    strip_chrome(&mut doc);

    let extracted_title = extract_title(&doc);
    let content = collapse_whitespace(&extract_body(&doc));
    let word_count = content.split_whitespace().count() as u32;
    let success = content.chars().count() > MIN_CONTENT_CHARS && word_count > MIN_CONTENT_WORDS;

    ContentResult {
        content,
        extracted_title,
        word_count,
        success,
    }
}

/// Detached nodes stay in the arena, so later lookups must start from
/// `root_element()` rather than `Html::select`.
fn strip_chrome(doc: &mut Html) {
    let ids: Vec<_> = doc.select(&CHROME_SEL).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn extract_title(doc: &Html) -> String {
    TITLE_SELS
        .iter()
        .filter_map(|sel| doc.root_element().select(sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|title| title.chars().count() > MIN_TITLE_CHARS)
        .unwrap_or_default()
}

fn extract_body(doc: &Html) -> String {
    for sel in CONTENT_SELS.iter() {
        if let Some(el) = doc.root_element().select(sel).next() {
            let text = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
            if text.chars().count() > MIN_BLOCK_CHARS {
                return text;
            }
        }
    }

    doc.root_element()
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS && !is_boilerplate(text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_boilerplate(text: &str) -> bool {
    let lower = text.to_lowercase();
    BOILERPLATE.iter().any(|phrase| lower.contains(phrase))
}

// ---------------------------------------------------------------------------
// HTTP extractor
// ---------------------------------------------------------------------------

/// [`ContentExtractor`] backed by an [`HttpSession`].
pub struct HttpContentExtractor {
    session: HttpSession,
}

impl HttpContentExtractor {
    /// Uses the collection user agent and timeout with a shorter 1–2 s delay.
    pub fn new(config: &CollectionConfig) -> Self {
        Self::with_settings(HttpSettings {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            politeness: Politeness::new(1.0, 2.0),
        })
    }

    pub fn with_settings(settings: HttpSettings) -> Self {
        Self {
            session: HttpSession::new(settings),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }
}

#[async_trait]
impl ContentExtractor for HttpContentExtractor {
    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<ContentResult> {
        let html = self.session.get_html(url).await?;
        let result = extract_from_html(&html);
        debug!(
            words = result.word_count,
            success = result.success,
            "content extracted"
        );
        Ok(result)
    }

    fn close(&self) {
        self.session.close();
    }
}
