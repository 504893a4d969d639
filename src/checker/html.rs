//! Single-document scanning
//!
//! Parses one HTML document, extracts candidate links, decides exclusion
//! for each in document order, and drives the owned [`UrlChecker`] for the
//! rest. One scan may be active per instance at a time.
//!
//! The `complete` signal fires exactly once per scan, once the document
//! has been processed *and* the check queue is empty — whichever side
//! finishes last. Both race outcomes are handled by re-checking the two
//! conditions under the scan lock from both paths.

use crate::checker::url::{UrlCheckObserver, UrlChecker};
use crate::config::CheckerConfig;
use crate::http::HttpClient;
use crate::link::{match_url, tags, BrokenReason, ExcludedReason, Link};
use crate::robots::{RobotDirective, RobotDirectives};
use crate::scrape::scrape_html;
use crate::ConfigError;
use scraper::Html;
use std::sync::{Arc, Mutex, Weak};
use url::Url;

/// Observer for [`HtmlChecker`] signals
pub trait HtmlCheckObserver<D>: Send + Sync {
    /// The document was parsed and its robots directives collected
    fn on_document(&self, document: &Html, robots: &RobotDirectives, custom: &D) {
        let _ = (document, robots, custom);
    }

    /// A link finished checking
    fn on_link(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// A link was excluded from checking
    fn on_junk(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// The scan finished: document processed and check queue drained
    fn on_complete(&self, custom: &D) {
        let _ = custom;
    }

    /// Extension hook: veto a link with a custom exclusion reason
    ///
    /// Runs after every built-in exclusion check.
    fn filter(&self, link: &Link, custom: &D) -> Option<ExcludedReason> {
        let _ = (link, custom);
        None
    }
}

struct ScanState<D> {
    custom: D,
    /// Document fully processed; completion also needs a drained queue
    parsed: bool,
}

struct HtmlInner<D> {
    config: Arc<CheckerConfig>,
    observer: Arc<dyn HtmlCheckObserver<D>>,
    url_checker: UrlChecker<D>,
    scan: Mutex<Option<ScanState<D>>>,
}

/// Scans one HTML document at a time and checks the links it contains
pub struct HtmlChecker<D = ()> {
    inner: Arc<HtmlInner<D>>,
}

impl<D> Clone for HtmlChecker<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Forwards the owned UrlChecker's signals into the scan lifecycle
struct UrlBridge<D> {
    html: Weak<HtmlInner<D>>,
}

impl<D: Clone + Send + Sync + 'static> UrlCheckObserver<D> for UrlBridge<D> {
    fn on_link(&self, link: &Link, custom: &D) {
        if let Some(html) = self.html.upgrade() {
            html.observer.on_link(link, custom);
        }
    }

    fn on_end(&self) {
        if let Some(html) = self.html.upgrade() {
            maybe_complete(&html);
        }
    }
}

impl<D: Clone + Send + Sync + 'static> HtmlChecker<D> {
    /// Creates a checker with its own HTTP client
    pub fn new(
        config: CheckerConfig,
        observer: Arc<dyn HtmlCheckObserver<D>>,
    ) -> Result<Self, ConfigError> {
        let client = HttpClient::new(&config)?;
        Ok(Self::with_client(
            Arc::new(config),
            Arc::new(client),
            observer,
        ))
    }

    pub(crate) fn with_client(
        config: Arc<CheckerConfig>,
        client: Arc<HttpClient>,
        observer: Arc<dyn HtmlCheckObserver<D>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<HtmlInner<D>>| {
            let bridge = Arc::new(UrlBridge { html: weak.clone() });
            HtmlInner {
                url_checker: UrlChecker::with_client(Arc::clone(&config), client, bridge),
                config,
                observer,
                scan: Mutex::new(None),
            }
        });
        Self { inner }
    }

    /// Scans a document and enqueues its checkable links
    ///
    /// Returns false (and does nothing) if a scan is already active on
    /// this instance. Pass `robots` to layer header-sourced directives
    /// under the document's own; `None` starts an empty aggregate.
    pub fn scan(
        &self,
        html: &str,
        base_url: &Url,
        robots: Option<RobotDirectives>,
        custom: D,
    ) -> bool {
        let inner = &self.inner;
        {
            let mut scan = inner.scan.lock().unwrap();
            if scan.is_some() {
                return false;
            }
            *scan = Some(ScanState {
                custom: custom.clone(),
                parsed: false,
            });
        }

        let mut robots =
            robots.unwrap_or_else(|| RobotDirectives::new(&inner.config.user_agent));

        let document = Html::parse_document(html);
        let links = scrape_html(&document, base_url, Some(&mut robots));
        inner.observer.on_document(&document, &robots, &custom);

        let mut excluded_count = 0usize;
        for link in links {
            maybe_enqueue_link(inner, link, &robots, &custom, &mut excluded_count);
        }

        {
            let mut scan = inner.scan.lock().unwrap();
            if let Some(state) = scan.as_mut() {
                state.parsed = true;
            }
        }
        maybe_complete(inner);

        true
    }

    /// Whether a scan is currently active
    pub fn is_active(&self) -> bool {
        self.inner.scan.lock().unwrap().is_some()
    }

    pub fn pause(&self) {
        self.inner.url_checker.pause();
    }

    pub fn resume(&self) {
        self.inner.url_checker.resume();
    }

    pub fn num_active_links(&self) -> usize {
        self.inner.url_checker.num_active_links()
    }

    pub fn num_queued_links(&self) -> usize {
        self.inner.url_checker.num_queued_links()
    }

    pub fn clear_cache(&self) {
        self.inner.url_checker.clear_cache();
    }

    pub(crate) fn url_checker(&self) -> &UrlChecker<D> {
        &self.inner.url_checker
    }
}

/// Fires `complete` iff the document is processed and the queue is dry;
/// taking the scan state under the lock makes it fire exactly once
fn maybe_complete<D: Clone + Send + Sync + 'static>(inner: &Arc<HtmlInner<D>>) {
    let finished = {
        let mut scan = inner.scan.lock().unwrap();
        let ready = matches!(&*scan, Some(state) if state.parsed) && inner.url_checker.is_idle();
        if ready {
            scan.take()
        } else {
            None
        }
    };

    if let Some(state) = finished {
        tracing::debug!("scan complete");
        inner.observer.on_complete(&state.custom);
    }
}

/// Classifies one extracted link and either checks or junks it
fn maybe_enqueue_link<D: Clone + Send + Sync + 'static>(
    inner: &Arc<HtmlInner<D>>,
    mut link: Link,
    robots: &RobotDirectives,
    custom: &D,
    excluded_count: &mut usize,
) {
    // An unresolvable URL is terminal before any exclusion applies
    if link.url.rebased.is_none() {
        if let Some(html) = link.html.as_mut() {
            html.offset_index = Some(html.index - *excluded_count);
        }
        link.excluded = Some(false);
        link.broken = Some(true);
        link.broken_reason = Some(BrokenReason::Invalid);
        inner.observer.on_link(&link, custom);
        return;
    }

    match maybe_exclude_link(inner, &link, robots, custom) {
        Some(reason) => {
            if let Some(html) = link.html.as_mut() {
                html.offset_index = Some(*excluded_count);
            }
            *excluded_count += 1;
            link.excluded = Some(true);
            link.excluded_reason = Some(reason);
            inner.observer.on_junk(&link, custom);
        }
        None => {
            if let Some(html) = link.html.as_mut() {
                html.offset_index = Some(html.index - *excluded_count);
            }
            link.excluded = Some(false);

            if inner
                .url_checker
                .enqueue_link(link.clone(), custom.clone())
                .is_err()
            {
                // A rejected enqueue is a result, never a thrown error
                link.broken = Some(true);
                link.broken_reason = Some(BrokenReason::Invalid);
                inner.observer.on_link(&link, custom);
            }
        }
    }
}

/// Applies the exclusion checks in their documented order
fn maybe_exclude_link<D: Clone + Send + Sync + 'static>(
    inner: &Arc<HtmlInner<D>>,
    link: &Link,
    robots: &RobotDirectives,
    custom: &D,
) -> Option<ExcludedReason> {
    let config = &inner.config;
    let html = link.html.as_ref();

    if let Some(html) = html {
        if !tags::supported(config.filter_level, &html.tag_name, &html.attr_name) {
            return Some(ExcludedReason::Html);
        }
    }
    if config.exclude_external_links && link.internal == Some(false) {
        return Some(ExcludedReason::External);
    }
    if config.exclude_internal_links && link.internal == Some(true) {
        return Some(ExcludedReason::Internal);
    }
    if config.exclude_links_to_same_page && link.same_page == Some(true) {
        return Some(ExcludedReason::SamePage);
    }
    if let Some(rebased) = &link.url.rebased {
        if config.excluded_schemes.contains(rebased.scheme()) {
            return Some(ExcludedReason::Scheme);
        }
    }

    if config.honor_robot_exclusions {
        if robots.one_is(&[RobotDirective::NoFollow, RobotDirective::NoIndex]) {
            return Some(ExcludedReason::Robots);
        }
        if robots.is(RobotDirective::NoImageIndex) {
            if let Some(html) = html {
                if is_image_element(&html.tag_name, &html.attr_name) {
                    return Some(ExcludedReason::Robots);
                }
            }
        }
        if let Some(rel) = html.and_then(|html| html.attrs.get("rel")) {
            if rel
                .split_whitespace()
                .any(|token| token.eq_ignore_ascii_case("nofollow"))
            {
                return Some(ExcludedReason::Robots);
            }
        }
    }

    if let Some(rebased) = &link.url.rebased {
        if match_url(rebased.as_str(), &config.excluded_keywords) {
            return Some(ExcludedReason::Keyword);
        }
    }

    inner.observer.filter(link, custom)
}

/// The elements `noimageindex` applies to
fn is_image_element(tag: &str, attr: &str) -> bool {
    matches!(
        (tag, attr),
        ("img" | "input", "src") | ("menuitem", "icon") | ("video", "poster")
    )
}
