//! Shared HTTP session with a politeness delay.
//!
//! Collectors and the content extractor each own an [`HttpSession`]. The
//! underlying client is built lazily and dropped by [`HttpSession::close`],
//! which releases its connection pool.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::debug;

use clipping_shared::{ClippingError, CollectionConfig, Result};

// ---------------------------------------------------------------------------
// Politeness
// ---------------------------------------------------------------------------

/// Random delay slept before every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Politeness {
    min: Duration,
    max: Duration,
}

impl Politeness {
    /// Delay uniformly drawn from `[min_secs, max_secs]`. Negative or
    /// non-finite bounds are treated as zero.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let secs = |s: f64| {
            if s.is_finite() && s > 0.0 {
                Duration::from_secs_f64(s)
            } else {
                Duration::ZERO
            }
        };
        let (min, max) = (secs(min_secs), secs(max_secs));
        Self {
            min,
            max: max.max(min),
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Request settings shared by a session.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub politeness: Politeness,
}

impl From<&CollectionConfig> for HttpSettings {
    fn from(config: &CollectionConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            politeness: Politeness::new(config.min_delay_secs, config.max_delay_secs),
        }
    }
}

fn build_client(settings: &HttpSettings) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-BR,pt;q=0.8,en;q=0.6"),
    );

    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(settings.timeout)
        .build()
        .map_err(|e| ClippingError::config(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A lazily-built HTTP client that can be released explicitly.
pub struct HttpSession {
    settings: HttpSettings,
    client: Mutex<Option<Client>>,
}

impl HttpSession {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
        }
    }

    fn client(&self) -> Result<Client> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = build_client(&self.settings)?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Whether a client is currently held.
    pub fn is_open(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the client and its pooled connections. The next request builds a new one.
    pub fn close(&self) {
        let released = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("http session closed");
        }
    }

    /// Sleep the politeness delay, then GET `url` and return the body text.
    /// Non-2xx responses are network errors.
    pub async fn get_html(&self, url: &str) -> Result<String> {
        self.settings.politeness.pause().await;
        let client = self.client()?;

        debug!(url, "fetching");
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ClippingError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClippingError::network(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ClippingError::network(url, format!("body read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_settings() -> HttpSettings {
        HttpSettings {
            user_agent: "clipping-test".into(),
            timeout: Duration::from_secs(5),
            politeness: Politeness::none(),
        }
    }

    #[test]
    fn politeness_stays_within_bounds() {
        let p = Politeness::new(0.01, 0.02);
        for _ in 0..50 {
            let d = p.next_delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(Politeness::new(-1.0, f64::NAN).next_delay(), Duration::ZERO);
        assert_eq!(Politeness::new(2.0, 1.0).next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn settings_from_config() {
        let config = CollectionConfig::default();
        let settings = HttpSettings::from(&config);
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.politeness, Politeness::new(1.0, 3.0));
    }

    #[tokio::test]
    async fn get_html_sends_headers_and_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "clipping-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let session = HttpSession::new(quick_settings());
        let body = session
            .get_html(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<p>ok</p>");
        assert!(session.is_open());

        session.close();
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = HttpSession::new(quick_settings());
        let err = session.get_html(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ClippingError::Network { .. }));
        assert!(err.to_string().contains("503"));
    }
}
