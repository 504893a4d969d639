//! Concurrent URL checking
//!
//! Turns a [`Link`] into a broken/not-broken verdict. Checks run through
//! the rate-limited queue under the configured global and per-host caps.
//! With caching enabled, a pending response future is stored *before* the
//! network call settles, so any concurrent check of the same canonical
//! URL awaits the in-flight request instead of issuing its own — at most
//! one outstanding request per canonical URL.

use crate::cache::UrlCache;
use crate::config::CheckerConfig;
use crate::http::{HttpClient, ResponseSnapshot};
use crate::link::{is_same_resource, BrokenReason, Link};
use crate::queue::{QueueId, QueueLimits, TaskQueue};
use crate::{ConfigError, EnqueueError, RequestFailure};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::Arc;

/// Outcome of one settled request
pub(crate) type HttpResult = Result<ResponseSnapshot, RequestFailure>;

/// A response outcome that may still be in flight; clones share one request
pub(crate) type SharedOutcome = Shared<BoxFuture<'static, Arc<HttpResult>>>;

/// Wraps an already-settled outcome for cache insertion
pub(crate) fn ready_outcome(result: HttpResult) -> SharedOutcome {
    futures::future::ready(Arc::new(result)).boxed().shared()
}

/// Observer for [`UrlChecker`] signals
pub trait UrlCheckObserver<D>: Send + Sync {
    /// A link finished checking (or was terminally invalid)
    fn on_link(&self, link: &Link, custom: &D) {
        let _ = (link, custom);
    }

    /// The check queue ran dry
    fn on_end(&self) {}
}

struct UrlInner<D> {
    config: Arc<CheckerConfig>,
    client: Arc<HttpClient>,
    cache: UrlCache<SharedOutcome>,
    queue: TaskQueue,
    observer: Arc<dyn UrlCheckObserver<D>>,
}

/// Cache-aware concurrent URL checking engine
pub struct UrlChecker<D = ()> {
    inner: Arc<UrlInner<D>>,
}

impl<D> Clone for UrlChecker<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Clone + Send + Sync + 'static> UrlChecker<D> {
    /// Creates a checker with its own HTTP client
    pub fn new(
        config: CheckerConfig,
        observer: Arc<dyn UrlCheckObserver<D>>,
    ) -> Result<Self, ConfigError> {
        let client = HttpClient::new(&config)?;
        Ok(Self::with_client(
            Arc::new(config),
            Arc::new(client),
            observer,
        ))
    }

    /// Creates a checker sharing the stack's client
    pub(crate) fn with_client(
        config: Arc<CheckerConfig>,
        client: Arc<HttpClient>,
        observer: Arc<dyn UrlCheckObserver<D>>,
    ) -> Self {
        let limits = QueueLimits {
            max_concurrent: config.max_sockets,
            max_per_host: config.max_sockets_per_host,
            rate_limit: config.rate_limit,
        };
        let queue = {
            let observer = Arc::clone(&observer);
            TaskQueue::new(limits, move || observer.on_end())
        };

        Self {
            inner: Arc::new(UrlInner {
                cache: UrlCache::new(config.cache_expiry_time),
                config,
                client,
                queue,
                observer,
            }),
        }
    }

    /// Queues a bare absolute URL for checking
    ///
    /// Relative or unparseable input fails fast; links discovered inside
    /// a page go through [`UrlChecker::enqueue_link`] instead.
    pub fn enqueue(&self, url: &str, custom: D) -> Result<QueueId, EnqueueError> {
        let link = Link::from_url(url);
        if link.url.rebased.is_none() {
            return Err(EnqueueError::InvalidUrl(url.to_string()));
        }
        self.enqueue_link(link, custom)
    }

    /// Queues an already-resolved link for checking
    pub fn enqueue_link(&self, link: Link, custom: D) -> Result<QueueId, EnqueueError> {
        if link.url.rebased.is_none() {
            return Err(EnqueueError::InvalidUrl(link.url.original.clone()));
        }

        let host = link.host_key();
        let inner = Arc::clone(&self.inner);
        let id = self
            .inner
            .queue
            .enqueue(host, Box::new(move || check_link(inner, link, custom).boxed()));
        Ok(id)
    }

    /// Removes a queued (not yet started) check
    pub fn dequeue(&self, id: QueueId) -> bool {
        self.inner.queue.dequeue(id)
    }

    /// Suspends dispatch; in-flight checks run to completion
    pub fn pause(&self) {
        self.inner.queue.pause();
    }

    /// Resumes dispatch
    pub fn resume(&self) {
        self.inner.queue.resume();
    }

    pub fn num_active_links(&self) -> usize {
        self.inner.queue.num_active()
    }

    pub fn num_queued_links(&self) -> usize {
        self.inner.queue.num_queued()
    }

    /// Whether no check is running or waiting
    pub(crate) fn is_idle(&self) -> bool {
        self.inner.queue.is_idle()
    }

    /// Drops every cached response
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// The response cache, shared with the page-fetching layer
    pub(crate) fn response_cache(&self) -> UrlCache<SharedOutcome> {
        self.inner.cache.clone()
    }
}

/// Checks one dequeued link
async fn check_link<D: Clone + Send + Sync + 'static>(
    inner: Arc<UrlInner<D>>,
    mut link: Link,
    custom: D,
) {
    let config = &inner.config;

    // Unparseable or unsupported-scheme URLs are terminal without a
    // network call
    let rebased = match link.url.rebased.clone() {
        Some(rebased) if config.accepted_schemes.contains(rebased.scheme()) => rebased,
        _ => {
            link.broken = Some(true);
            link.broken_reason = Some(BrokenReason::Invalid);
            inner.observer.on_link(&link, &custom);
            return;
        }
    };

    let outcome;
    let from_cache;

    if config.cache_responses {
        // The pending future is inserted before the request settles (and
        // atomically with the lookup), so every concurrent check of this
        // URL awaits the one in-flight request
        let (pending, hit) = inner
            .cache
            .get_or_insert_with(&rebased, || make_request(&inner, rebased.clone()));
        if hit {
            tracing::debug!(url = %rebased, "check shares a cached response");
        }
        outcome = pending.await;
        from_cache = hit;
    } else {
        let result = inner
            .client
            .request(&rebased, config.request_method, config.retry_405_head)
            .await;
        outcome = Arc::new(result);
        from_cache = false;
    }

    copy_response_data(&mut link, &outcome);
    link.http.cached = from_cache;
    inner.observer.on_link(&link, &custom);
}

/// Builds the shared request future for one canonical URL
///
/// On settlement it seeds the cache with the final response URL (when the
/// request was redirected) and with every intermediate hop that is not
/// already cached, so later lookups of any alias short-circuit.
fn make_request<D: Clone + Send + Sync + 'static>(
    inner: &Arc<UrlInner<D>>,
    url: url::Url,
) -> SharedOutcome {
    let client = Arc::clone(&inner.client);
    let cache = inner.cache.clone();
    let method = inner.config.request_method;
    let retry_405 = inner.config.retry_405_head;

    async move {
        let result = client.request(&url, method, retry_405).await;

        if let Ok(response) = &result {
            if response.url != url {
                cache.set(response.url.clone(), ready_outcome(Ok(response.clone())));
            }
            for hop in &response.redirects {
                if !cache.contains(&hop.url) {
                    cache.set(
                        hop.url.clone(),
                        ready_outcome(Ok(ResponseSnapshot::from_hop(hop))),
                    );
                }
            }
        }

        Arc::new(result)
    }
    .boxed()
    .shared()
}

/// Copies a settled outcome into the link and classifies it
fn copy_response_data(link: &mut Link, outcome: &HttpResult) {
    match outcome {
        Ok(response) => {
            if response.is_success() {
                link.broken = Some(false);
            } else {
                link.broken = Some(true);
                link.broken_reason = Some(BrokenReason::HttpStatus(response.status));
            }

            // Cloned so later mutations cannot reach cached entries
            link.http.response = Some(response.clone());

            if let Some(rebased) = &link.url.rebased {
                if !is_same_resource(&response.url, rebased) {
                    link.redirect(response.url.clone());
                }
            }
        }
        Err(failure) => {
            link.broken = Some(true);
            link.broken_reason = Some(match failure.errno {
                Some(code) => BrokenReason::Errno(code),
                None => BrokenReason::Unknown,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use url::Url;

    fn snapshot(url: &str, status: u16) -> ResponseSnapshot {
        ResponseSnapshot {
            url: Url::parse(url).unwrap(),
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            redirects: Vec::new(),
        }
    }

    #[test]
    fn test_copy_response_data_success() {
        let mut link = Link::from_url("https://example.com/page");
        copy_response_data(&mut link, &Ok(snapshot("https://example.com/page", 200)));
        assert_eq!(link.broken, Some(false));
        assert!(link.broken_reason.is_none());
        assert!(link.url.redirected.is_none());
    }

    #[test]
    fn test_copy_response_data_http_error() {
        let mut link = Link::from_url("https://example.com/missing");
        copy_response_data(&mut link, &Ok(snapshot("https://example.com/missing", 404)));
        assert_eq!(link.broken, Some(true));
        assert_eq!(
            link.broken_reason.as_ref().unwrap().code(),
            "HTTP_404"
        );
    }

    #[test]
    fn test_copy_response_data_transport_error() {
        let mut link = Link::from_url("https://example.com/");
        copy_response_data(
            &mut link,
            &Err(RequestFailure {
                message: "connection refused".to_string(),
                errno: Some("ECONNREFUSED"),
            }),
        );
        assert_eq!(
            link.broken_reason.as_ref().unwrap().code(),
            "ERRNO_ECONNREFUSED"
        );

        let mut link = Link::from_url("https://example.com/");
        copy_response_data(
            &mut link,
            &Err(RequestFailure {
                message: "mystery".to_string(),
                errno: None,
            }),
        );
        assert_eq!(link.broken_reason.as_ref().unwrap().code(), "BLC_UNKNOWN");
    }

    #[test]
    fn test_redirect_detection_threshold() {
        // Query-only difference: same resource, no redirect recorded
        let mut link = Link::from_url("https://example.com/page");
        copy_response_data(&mut link, &Ok(snapshot("https://example.com/page?v=2", 200)));
        assert!(link.url.redirected.is_none());

        // Path difference: a true redirect
        let mut link = Link::from_url("https://example.com/page");
        copy_response_data(&mut link, &Ok(snapshot("https://example.com/other", 200)));
        assert_eq!(
            link.url.redirected.as_ref().unwrap().as_str(),
            "https://example.com/other"
        );
    }
}
