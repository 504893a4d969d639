//! Linkrot: a broken-link finder for pages and whole sites
//!
//! This crate discovers link-bearing elements in HTML documents, resolves
//! them to absolute URLs, checks whether each target is reachable, and can
//! recursively crawl a site while respecting robots exclusions and never
//! re-checking a URL or page.
//!
//! The four checking layers build on each other:
//! - [`checker::UrlChecker`] — concurrent, cache-deduplicated URL checks
//! - [`checker::HtmlChecker`] — scan one HTML document and check its links
//! - [`checker::HtmlUrlChecker`] — fetch pages one at a time and scan them
//! - [`checker::SiteChecker`] — recursively crawl a whole site

pub mod cache;
pub mod checker;
pub mod config;
pub mod http;
pub mod link;
pub mod queue;
pub mod robots;
pub mod scrape;

use thiserror::Error;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Synchronous enqueue failures
///
/// Distinct from the asynchronous `BLC_INVALID` classification: only
/// malformed caller input is rejected at the call site. Links discovered
/// inside a page never abort a scan.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// A transport-level request failure, reduced to cloneable data
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestFailure {
    /// Human-readable description of the failure
    pub message: String,

    /// Known transport error code (e.g. `ECONNREFUSED`), if recognized
    pub errno: Option<&'static str>,
}

/// Errors that terminate a single page's scan
///
/// Surfaced through the `page` signal, never raised to the caller
/// asynchronously.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("HTML could not be retrieved (HTTP {status})")]
    HtmlRetrieval { status: u16 },

    #[error("Expected \"text/html\" but got \"{content_type}\"")]
    UnexpectedContentType { content_type: String },

    #[error(transparent)]
    Request(#[from] RequestFailure),
}

// Re-export commonly used types
pub use cache::UrlCache;
pub use checker::{
    HtmlCheckObserver, HtmlChecker, HtmlUrlChecker, HtmlUrlObserver, SiteChecker, SiteObserver,
    UrlCheckObserver, UrlChecker,
};
pub use config::{CheckerConfig, CheckerOptions, FilterLevel, RequestMethod};
pub use http::{RedirectHop, ResponseSnapshot};
pub use link::{BrokenReason, ExcludedReason, Link};
pub use robots::{RobotDirective, RobotDirectives, RobotsTxt};
