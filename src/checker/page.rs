//! Per-page orchestration
//!
//! Fetches pages strictly serially (queue concurrency 1) and scans each
//! with the owned [`HtmlChecker`]; links within a page still check
//! concurrently. Page context (URL, response, caller data) is threaded
//! through the scan as a value, so nothing leaks between pages.

use crate::checker::html::{HtmlCheckObserver, HtmlChecker};
use crate::checker::url::ready_outcome;
use crate::config::CheckerConfig;
use crate::http::{HttpClient, ResponseSnapshot};
use crate::link::{ExcludedReason, Link};
use crate::queue::{QueueId, QueueLimits, TaskQueue};
use crate::robots::RobotDirectives;
use crate::{ConfigError, EnqueueError, PageError};
use futures::FutureExt;
use scraper::Html;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use url::Url;

/// Observer for [`HtmlUrlChecker`] signals
pub trait HtmlUrlObserver<D>: Send + Sync {
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

    /// A link on the current page finished checking
    fn on_link(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// A link on the current page was excluded
    fn on_junk(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// A page finished: `error` is set when its HTML could not be used
    fn on_page(&self, error: Option<&PageError>, page_url: &Url, custom: &D) {
        let _ = (error, page_url, custom);
    }

    /// The page queue ran dry
    fn on_end(&self) {}

    /// Extension hook: veto a link with a custom exclusion reason
    fn filter(&self, link: &Link, custom: &D) -> Option<ExcludedReason> {
        let _ = (link, custom);
        None
    }
}

/// Everything a page's signals need, created per page and dropped with it
struct PageContext<D> {
    page_url: Url,
    response: ResponseSnapshot,
    custom: D,
    /// Resolves when the page's scan completes
    done: Mutex<Option<oneshot::Sender<()>>>,
}

struct PageInner<D> {
    config: Arc<CheckerConfig>,
    client: Arc<HttpClient>,
    observer: Arc<dyn HtmlUrlObserver<D>>,
    html_checker: HtmlChecker<Arc<PageContext<D>>>,
    page_queue: TaskQueue,
}

/// Fetches and scans pages one at a time
pub struct HtmlUrlChecker<D = ()> {
    inner: Arc<PageInner<D>>,
}

impl<D> Clone for HtmlUrlChecker<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Adapts document-scan signals into page-scoped ones
struct HtmlBridge<D> {
    page: Weak<PageInner<D>>,
}

impl<D: Send + Sync + 'static> HtmlCheckObserver<Arc<PageContext<D>>> for HtmlBridge<D> {
    fn on_document(
        &self,
        document: &Html,
        robots: &RobotDirectives,
        ctx: &Arc<PageContext<D>>,
    ) {
        if let Some(page) = self.page.upgrade() {
            page.observer
                .on_document(document, robots, &ctx.response, &ctx.page_url, &ctx.custom);
        }
    }

    fn on_link(&self, link: &Link, ctx: &Arc<PageContext<D>>) {
        if let Some(page) = self.page.upgrade() {
            page.observer.on_link(link, &ctx.custom);
        }
    }

    fn on_junk(&self, link: &Link, ctx: &Arc<PageContext<D>>) {
        if let Some(page) = self.page.upgrade() {
            page.observer.on_junk(link, &ctx.custom);
        }
    }

    fn on_complete(&self, ctx: &Arc<PageContext<D>>) {
        if let Some(done) = ctx.done.lock().unwrap().take() {
            let _ = done.send(());
        }
    }

    fn filter(&self, link: &Link, ctx: &Arc<PageContext<D>>) -> Option<ExcludedReason> {
        self.page
            .upgrade()
            .and_then(|page| page.observer.filter(link, &ctx.custom))
    }
}

impl<D: Send + Sync + 'static> HtmlUrlChecker<D> {
    /// Creates a checker with its own HTTP client
    pub fn new(
        config: CheckerConfig,
        observer: Arc<dyn HtmlUrlObserver<D>>,
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
        observer: Arc<dyn HtmlUrlObserver<D>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<PageInner<D>>| {
            let bridge = Arc::new(HtmlBridge { page: weak.clone() });
            let html_checker =
                HtmlChecker::with_client(Arc::clone(&config), Arc::clone(&client), bridge);

            // Pages are fetched strictly serially
            let page_queue = {
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

            PageInner {
                config,
                client,
                observer,
                html_checker,
                page_queue,
            }
        });
        Self { inner }
    }

    /// Queues a page for fetching and scanning
    pub fn enqueue(&self, page_url: &str, custom: D) -> Result<QueueId, EnqueueError> {
        let url = Url::parse(page_url)
            .map_err(|_| EnqueueError::InvalidUrl(page_url.to_string()))?;
        Ok(self.enqueue_url(url, custom))
    }

    /// Queues an already-parsed page URL
    pub(crate) fn enqueue_url(&self, page_url: Url, custom: D) -> QueueId {
        let inner = Arc::clone(&self.inner);
        self.inner.page_queue.enqueue(
            None,
            Box::new(move || process_page(inner, page_url, custom).boxed()),
        )
    }

    /// Removes a queued (not yet started) page
    pub fn dequeue(&self, id: QueueId) -> bool {
        self.inner.page_queue.dequeue(id)
    }

    pub fn pause(&self) {
        self.inner.html_checker.pause();
        self.inner.page_queue.pause();
    }

    pub fn resume(&self) {
        self.inner.html_checker.resume();
        self.inner.page_queue.resume();
    }

    /// Pages still queued or being processed
    pub fn num_pages(&self) -> usize {
        self.inner.page_queue.num_queued() + self.inner.page_queue.num_active()
    }

    pub fn num_active_links(&self) -> usize {
        self.inner.html_checker.num_active_links()
    }

    pub fn num_queued_links(&self) -> usize {
        self.inner.html_checker.num_queued_links()
    }

    pub fn clear_cache(&self) {
        self.inner.html_checker.clear_cache();
    }
}

/// Fetches one page, scans it, and reports its completion
async fn process_page<D: Send + Sync + 'static>(
    inner: Arc<PageInner<D>>,
    page_url: Url,
    custom: D,
) {
    tracing::info!(page = %page_url, "fetching page");

    match inner.client.fetch_html(&page_url).await {
        Ok((response, body)) => {
            if inner.config.cache_responses {
                // Later link checks against this page short-circuit
                let cache = inner.html_checker.url_checker().response_cache();
                if response.url != page_url {
                    cache.set(response.url.clone(), ready_outcome(Ok(response.clone())));
                }
                cache.set(page_url.clone(), ready_outcome(Ok(response.clone())));
            }

            // Header directives first, so in-document metas layer on top
            let mut robots = RobotDirectives::new(&inner.config.user_agent);
            if let Some(value) = response.headers.get("x-robots-tag") {
                robots.header(value);
            }

            let (done, completed) = oneshot::channel();
            let base_url = response.url.clone();
            let ctx = Arc::new(PageContext {
                page_url: page_url.clone(),
                response,
                custom,
                done: Mutex::new(Some(done)),
            });

            let started =
                inner
                    .html_checker
                    .scan(&body, &base_url, Some(robots), Arc::clone(&ctx));
            if started {
                let _ = completed.await;
            } else {
                tracing::warn!(page = %page_url, "scan refused; page skipped");
            }

            inner.observer.on_page(None, &page_url, &ctx.custom);
        }
        Err(error) => {
            tracing::warn!(page = %page_url, error = %error, "page retrieval failed");
            inner.observer.on_page(Some(&error), &page_url, &custom);
        }
    }
}
