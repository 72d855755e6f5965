//! URL handling module for Folio
//!
//! This module provides the URL rules a crawl job runs on:
//! - Visit keys, so equivalent spellings of one URL are fetched once
//! - Site scoping, which decides whether a link stays on the seed's site

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, SiteScope};
pub use normalize::{normalize, normalize_url};
