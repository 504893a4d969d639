//! Recursive site crawling
//!
//! Crawls one site at a time through the owned [`HtmlUrlChecker`],
//! following internal links that the recursive tag table supports. Every
//! followed link is checked against the per-site visited set before being
//! enqueued, which is what terminates recursion on circular link graphs —
//! no depth limit exists or is needed. Robots.txt (when honored) vetoes
//! internal links through the filter hook.

use crate::cache::UrlCache;
use crate::checker::page::{HtmlUrlChecker, HtmlUrlObserver};
use crate::config::CheckerConfig;
use crate::http::{HttpClient, ResponseSnapshot};
use crate::link::{tags, ExcludedReason, Link};
use crate::queue::{QueueId, QueueLimits, TaskQueue};
use crate::robots::{fetch_robots_txt, RobotDirectives, RobotsTxt};
use crate::{ConfigError, EnqueueError, PageError};
use futures::FutureExt;
use scraper::Html;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use url::Url;

/// Observer for [`SiteChecker`] signals
pub trait SiteObserver<D>: Send + Sync {
    /// robots.txt was fetched for the site being crawled
    fn on_robots(&self, robots: &RobotsTxt, custom: &D) {
        let _ = (robots, custom);
    }

    /// A page's document was parsed
    fn on_document(
        &self,
        document: &Html,
        robots: &RobotDirectives,
        response: &ResponseSnapshot,
        page_url: &Url,
        custom: &D,
    ) {
        let _ = (document, robots, response, page_url, custom);
    }

    /// A link somewhere on the site finished checking
    fn on_link(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// A link somewhere on the site was excluded
    fn on_junk(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// A page of the site finished
    fn on_page(&self, error: Option<&PageError>, page_url: &Url, custom: &D) {
        let _ = (error, page_url, custom);
    }

    /// The whole site finished; `error` is the first page's error, if any
    fn on_site(&self, error: Option<&PageError>, site_url: &Url, custom: &D) {
        let _ = (error, site_url, custom);
    }

    /// The site queue ran dry
    fn on_end(&self) {}

    /// Extension hook: veto a link with a custom exclusion reason
    fn filter(&self, link: &Link, custom: &D) -> Option<ExcludedReason> {
        let _ = (link, custom);
        None
    }
}

/// Everything one site crawl needs, created per site and dropped with it
struct SiteContext<D> {
    site_url: Url,
    custom: D,
    robots: RobotsTxt,
    /// Pages (and redirect aliases) already fetched or enqueued this crawl
    visited: UrlCache<()>,
    first_page_error: Mutex<Option<PageError>>,
    pages_completed: AtomicUsize,
}

struct SiteInner<D> {
    config: Arc<CheckerConfig>,
    client: Arc<HttpClient>,
    observer: Arc<dyn SiteObserver<D>>,
    page_checker: HtmlUrlChecker<Arc<SiteContext<D>>>,
    site_queue: TaskQueue,
    /// Completion signal of the site currently crawling (concurrency is 1)
    current_done: Mutex<Option<oneshot::Sender<()>>>,
}

/// Crawls whole sites, one at a time
pub struct SiteChecker<D = ()> {
    inner: Arc<SiteInner<D>>,
}

impl<D> Clone for SiteChecker<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Adapts page-layer signals into the crawl lifecycle
struct PageBridge<D> {
    site: Weak<SiteInner<D>>,
}

impl<D: Send + Sync + 'static> HtmlUrlObserver<Arc<SiteContext<D>>> for PageBridge<D> {
    fn on_document(
        &self,
        document: &Html,
        robots: &RobotDirectives,
        response: &ResponseSnapshot,
        page_url: &Url,
        ctx: &Arc<SiteContext<D>>,
    ) {
        // A redirected page is known under every URL along the chain;
        // mark them all so no alias is fetched again
        if response.url != *page_url {
            ctx.visited.set(response.url.clone(), ());
            for hop in &response.redirects {
                ctx.visited.set(hop.url.clone(), ());
            }
        }

        if let Some(site) = self.site.upgrade() {
            site.observer
                .on_document(document, robots, response, page_url, &ctx.custom);
        }
    }

    fn on_link(&self, link: &Link, ctx: &Arc<SiteContext<D>>) {
        if let Some(site) = self.site.upgrade() {
            site.observer.on_link(link, &ctx.custom);
            maybe_enqueue_page(&site, link, ctx);
        }
    }

    fn on_junk(&self, link: &Link, ctx: &Arc<SiteContext<D>>) {
        if let Some(site) = self.site.upgrade() {
            site.observer.on_junk(link, &ctx.custom);
            maybe_enqueue_page(&site, link, ctx);
        }
    }

    fn on_page(&self, error: Option<&PageError>, page_url: &Url, ctx: &Arc<SiteContext<D>>) {
        if let Some(site) = self.site.upgrade() {
            site.observer.on_page(error, page_url, &ctx.custom);
        }

        // Only the first page's failure fails the site
        if ctx.pages_completed.fetch_add(1, Ordering::SeqCst) == 0 {
            *ctx.first_page_error.lock().unwrap() = error.cloned();
        }
    }

    fn on_end(&self) {
        if let Some(site) = self.site.upgrade() {
            let done = site.current_done.lock().unwrap().take();
            if let Some(done) = done {
                let _ = done.send(());
            }
        }
    }

    fn filter(&self, link: &Link, ctx: &Arc<SiteContext<D>>) -> Option<ExcludedReason> {
        let site = self.site.upgrade()?;

        // Internal links disallowed by robots.txt are junk, not checked
        if site.config.honor_robot_exclusions && link.internal == Some(true) {
            if let Some(rebased) = &link.url.rebased {
                if !ctx.robots.is_allowed(&site.config.user_agent, rebased.as_str()) {
                    return Some(ExcludedReason::Robots);
                }
            }
        }

        site.observer.filter(link, &ctx.custom)
    }
}

impl<D: Send + Sync + 'static> SiteChecker<D> {
    /// Creates a checker with its own HTTP client
    pub fn new(
        config: CheckerConfig,
        observer: Arc<dyn SiteObserver<D>>,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(config);
        let client = Arc::new(HttpClient::new(&config)?);

        let inner = Arc::new_cyclic(|weak: &Weak<SiteInner<D>>| {
            let bridge = Arc::new(PageBridge { site: weak.clone() });
            let page_checker =
                HtmlUrlChecker::with_client(Arc::clone(&config), Arc::clone(&client), bridge);

            // One site crawl at a time
            let site_queue = {
                let observer = Arc::clone(&observer);
                TaskQueue::new(
                    QueueLimits {
                        max_concurrent: 1,
                        max_per_host: 1,
                        rate_limit: config.rate_limit,
                    },
                    move || observer.on_end(),
                )
            };

            SiteInner {
                config,
                client,
                observer,
                page_checker,
                site_queue,
                current_done: Mutex::new(None),
            }
        });

        Ok(Self { inner })
    }

    /// Queues a whole-site crawl starting at `site_url`
    pub fn enqueue(&self, site_url: &str, custom: D) -> Result<QueueId, EnqueueError> {
        let url = Url::parse(site_url)
            .map_err(|_| EnqueueError::InvalidUrl(site_url.to_string()))?;

        let inner = Arc::clone(&self.inner);
        Ok(self.inner.site_queue.enqueue(
            None,
            Box::new(move || process_site(inner, url, custom).boxed()),
        ))
    }

    /// Removes a queued (not yet started) site
    pub fn dequeue(&self, id: QueueId) -> bool {
        self.inner.site_queue.dequeue(id)
    }

    pub fn pause(&self) {
        self.inner.page_checker.pause();
        self.inner.site_queue.pause();
    }

    pub fn resume(&self) {
        self.inner.page_checker.resume();
        self.inner.site_queue.resume();
    }

    /// Sites still queued or crawling
    pub fn num_sites(&self) -> usize {
        self.inner.site_queue.num_queued() + self.inner.site_queue.num_active()
    }

    pub fn num_pages(&self) -> usize {
        self.inner.page_checker.num_pages()
    }

    pub fn num_active_links(&self) -> usize {
        self.inner.page_checker.num_active_links()
    }

    pub fn num_queued_links(&self) -> usize {
        self.inner.page_checker.num_queued_links()
    }

    /// Drops cached responses; the visited set of a running crawl is kept
    pub fn clear_cache(&self) {
        self.inner.page_checker.clear_cache();
    }
}

/// Crawls one dequeued site to completion
async fn process_site<D: Send + Sync + 'static>(
    inner: Arc<SiteInner<D>>,
    site_url: Url,
    custom: D,
) {
    tracing::info!(site = %site_url, "starting site crawl");

    // robots.txt failure is absorbed; a real connectivity problem will
    // resurface on the first page fetch
    let mut fetched_robots = None;
    if inner.config.honor_robot_exclusions {
        match fetch_robots_txt(&inner.client, &site_url).await {
            Ok(robots) => fetched_robots = Some(robots),
            Err(error) => {
                tracing::debug!(site = %site_url, error = %error, "robots.txt unavailable");
            }
        }
    }

    let ctx = Arc::new(SiteContext {
        site_url: site_url.clone(),
        custom,
        robots: fetched_robots.clone().unwrap_or_else(RobotsTxt::allow_all),
        visited: UrlCache::new(inner.config.cache_expiry_time),
        first_page_error: Mutex::new(None),
        pages_completed: AtomicUsize::new(0),
    });

    if let Some(robots) = &fetched_robots {
        inner.observer.on_robots(robots, &ctx.custom);
    }

    let (done, crawled) = oneshot::channel();
    *inner.current_done.lock().unwrap() = Some(done);

    // The start page is visited before its fetch, so in-site links back to
    // it are never re-enqueued
    ctx.visited.set(site_url.clone(), ());
    inner
        .page_checker
        .enqueue_url(site_url.clone(), Arc::clone(&ctx));

    let _ = crawled.await;

    let error = ctx.first_page_error.lock().unwrap().clone();
    tracing::info!(
        site = %site_url,
        failed = error.is_some(),
        "site crawl finished"
    );
    inner.observer.on_site(error.as_ref(), &site_url, &ctx.custom);
}

/// Follows a link as a new page when the crawl rules allow it
fn maybe_enqueue_page<D: Send + Sync + 'static>(
    inner: &Arc<SiteInner<D>>,
    link: &Link,
    ctx: &Arc<SiteContext<D>>,
) -> bool {
    // Links excluded for these reasons are never followed
    if link.excluded == Some(true)
        && matches!(
            link.excluded_reason,
            Some(ExcludedReason::Keyword)
                | Some(ExcludedReason::Robots)
                | Some(ExcludedReason::Scheme)
        )
    {
        return false;
    }

    let Some(html) = link.html.as_ref() else {
        return false;
    };
    if !tags::supported_recursive(inner.config.filter_level, &html.tag_name, &html.attr_name) {
        return false;
    }
    if link.broken == Some(true) || link.internal != Some(true) {
        return false;
    }
    let Some(rebased) = link.url.rebased.clone() else {
        return false;
    };
    if ctx.visited.contains(&rebased) {
        return false;
    }
    if inner.config.honor_robot_exclusions
        && !ctx.robots.is_allowed(&inner.config.user_agent, rebased.as_str())
    {
        return false;
    }

    // A redirect into an already-visited page means the whole chain is
    // known; mark every hop so none is fetched independently
    if let Some(redirected) = &link.url.redirected {
        if ctx.visited.contains(redirected) {
            if let Some(response) = &link.http.response {
                for hop in &response.redirects {
                    ctx.visited.set(hop.url.clone(), ());
                }
            }
            return false;
        }
    }

    tracing::debug!(page = %rebased, site = %ctx.site_url, "following internal link");
    ctx.visited.set(rebased.clone(), ());
    inner.page_checker.enqueue_url(rebased, Arc::clone(ctx));
    true
}
