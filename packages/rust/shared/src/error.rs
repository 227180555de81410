//! Error types for the clipping pipeline.
//!
//! Library crates return [`ClippingError`]; the CLI reports it through
//! `color-eyre`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ClippingError {
    /// Bad configuration file, environment override or CLI value.
    #[error("config error: {message}")]
    Config { message: String },

    /// A request failed, timed out or returned a non-success status.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// A listing or article URL could not be built.
    #[error("invalid URL '{input}': {source}")]
    Url {
        input: String,
        source: url::ParseError,
    },

    #[error("storage error: {0}")]
    Storage(String),

    /// Term dictionary could not be read or contained no usable terms.
    #[error("dictionary error: {0}")]
    Dictionary(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored or supplied value is out of its domain (relevance label,
    /// trigger time, weekday).
    #[error("validation error: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, ClippingError>;

impl ClippingError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn network(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn url(input: impl Into<String>, source: url::ParseError) -> Self {
        Self::Url {
            input: input.into(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ClippingError::config("MAX_DELAY is not a number");
        assert_eq!(err.to_string(), "config error: MAX_DELAY is not a number");

        let err = ClippingError::network("https://www.camara.leg.br/noticias", "HTTP 503");
        assert_eq!(
            err.to_string(),
            "request to https://www.camara.leg.br/noticias failed: HTTP 503"
        );
        assert!(matches!(err, ClippingError::Network { .. }));

        let err = ClippingError::validation("unknown relevance label 'Urgente'");
        assert!(err.to_string().contains("Urgente"));

        let err = ClippingError::Dictionary("no terms loaded".into());
        assert_eq!(err.to_string(), "dictionary error: no terms loaded");
    }

    #[test]
    fn url_errors_keep_the_input() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = ClippingError::url("not a url", source);
        assert!(err.to_string().starts_with("invalid URL 'not a url'"));
    }
}
