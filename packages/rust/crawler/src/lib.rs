//! News collection and article extraction.
//!
//! This crate provides:
//! - [`collectors`]: the [`SourceCollector`] trait and listing collectors for
//!   Câmara dos Deputados, Senado Federal and Agência Gov
//! - [`extractor`]: the [`ContentExtractor`] trait and an HTTP implementation
//! - [`http`]: the shared session with its politeness delay

pub mod collectors;
pub mod extractor;
pub mod http;

pub use collectors::{
    AgenciaGovSite, CamaraSite, ListingCollector, ListingSite, SenadoSite, SourceCollector,
    default_collectors,
};
pub use extractor::{ContentExtractor, HttpContentExtractor, extract_from_html};
pub use http::{HttpSession, HttpSettings, Politeness};
