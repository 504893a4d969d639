//! HTTP transport
//!
//! One explicitly owned client per checker stack. Redirects are followed
//! manually (policy `none`, bounded hop count) so that every hop's URL,
//! status and headers can be recorded; the checking layers need the full
//! chain for cache seeding and visited-page tracking. Self-signed
//! certificates are accepted and environment-declared proxies are honored
//! by the client.

use crate::config::{CheckerConfig, RequestMethod};
use crate::{PageError, RequestFailure};
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Client, Method, Response};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::error::Error as _;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops before a chain is treated as broken
const MAX_REDIRECTS: usize = 10;

/// One intermediate response in a redirect chain
#[derive(Debug, Clone, Serialize)]
pub struct RedirectHop {
    /// URL this hop was requested at
    pub url: Url,

    /// Redirect status code (3xx)
    pub status: u16,

    /// Response headers of the hop
    pub headers: HashMap<String, String>,
}

/// A response reduced to the data the checking layers care about
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSnapshot {
    /// Final URL after following redirects
    pub url: Url,

    /// Final status code
    pub status: u16,

    /// Canonical status text, e.g. `Not Found`
    pub status_text: String,

    /// Final response headers, keys lowercased
    pub headers: HashMap<String, String>,

    /// Every intermediate redirect hop, in order
    pub redirects: Vec<RedirectHop>,
}

impl ResponseSnapshot {
    /// Whether the final status is a 2xx success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A snapshot standing in for a single redirect hop, so hop URLs can
    /// be cached like any other response
    pub(crate) fn from_hop(hop: &RedirectHop) -> Self {
        Self {
            url: hop.url.clone(),
            status: hop.status,
            status_text: status_text(hop.status),
            headers: hop.headers.clone(),
            redirects: Vec::new(),
        }
    }
}

/// HTTP client owned by a checker stack
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds the client from a validated configuration
    pub fn new(config: &CheckerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // redirects are followed manually
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Checks a URL, discarding any body
    ///
    /// With `retry_405` set, a HEAD check answered with 405 is retried
    /// once as GET and that result is returned instead.
    pub async fn request(
        &self,
        url: &Url,
        method: RequestMethod,
        retry_405: bool,
    ) -> Result<ResponseSnapshot, RequestFailure> {
        tracing::debug!(url = %url, method = method.as_str(), "checking URL");
        let (response, final_url, hops) = self.send_following(url, as_method(method)).await?;

        if response.status().as_u16() == 405 && method == RequestMethod::Head && retry_405 {
            tracing::debug!(url = %url, "HEAD not allowed, retrying once with GET");
            let (response, final_url, hops) = self.send_following(url, Method::GET).await?;
            return Ok(snapshot(&response, final_url, hops));
        }

        Ok(snapshot(&response, final_url, hops))
    }

    /// Fetches a page's HTML, following redirects
    ///
    /// Rejects non-2xx responses and responses whose content-type is
    /// present but not `text/html`; a missing content-type is tolerated.
    pub async fn fetch_html(&self, url: &Url) -> Result<(ResponseSnapshot, String), PageError> {
        let (response, final_url, hops) = self
            .send_following(url, Method::GET)
            .await
            .map_err(PageError::Request)?;

        let page = snapshot(&response, final_url, hops);

        if !page.is_success() {
            return Err(PageError::HtmlRetrieval {
                status: page.status,
            });
        }

        // Content-type is not mandatory in the HTTP spec
        if let Some(content_type) = page.headers.get("content-type") {
            if !content_type.trim_start().starts_with("text/html") {
                return Err(PageError::UnexpectedContentType {
                    content_type: content_type.clone(),
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|error| PageError::Request(classify_error(&error)))?;

        Ok((page, body))
    }

    /// Fetches a body as text with no status or content-type policy;
    /// used for robots.txt
    pub async fn fetch_text(
        &self,
        url: &Url,
    ) -> Result<(ResponseSnapshot, String), RequestFailure> {
        let (response, final_url, hops) = self.send_following(url, Method::GET).await?;
        let result = snapshot(&response, final_url, hops);
        let body = response.text().await.map_err(|error| classify_error(&error))?;
        Ok((result, body))
    }

    /// Sends a request and follows redirects up to [`MAX_REDIRECTS`],
    /// recording each hop
    async fn send_following(
        &self,
        url: &Url,
        method: Method,
    ) -> Result<(Response, Url, Vec<RedirectHop>), RequestFailure> {
        let mut current = url.clone();
        let mut hops: Vec<RedirectHop> = Vec::new();
        let mut seen: HashSet<Url> = HashSet::new();
        seen.insert(current.clone());

        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .send()
                .await
                .map_err(|error| classify_error(&error))?;

            let status = response.status();
            let location = if status.is_redirection() {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            } else {
                None
            };

            let Some(location) = location else {
                return Ok((response, current, hops));
            };

            let next = current.join(&location).map_err(|error| RequestFailure {
                message: format!("invalid redirect location {:?}: {}", location, error),
                errno: None,
            })?;

            hops.push(RedirectHop {
                url: current.clone(),
                status: status.as_u16(),
                headers: header_map(response.headers()),
            });

            if hops.len() > MAX_REDIRECTS {
                return Err(RequestFailure {
                    message: format!("more than {} redirects from {}", MAX_REDIRECTS, url),
                    errno: None,
                });
            }
            if !seen.insert(next.clone()) {
                return Err(RequestFailure {
                    message: format!("redirect loop detected at {}", next),
                    errno: None,
                });
            }

            tracing::trace!(from = %current, to = %next, status = status.as_u16(), "following redirect");
            current = next;
        }
    }
}

fn as_method(method: RequestMethod) -> Method {
    match method {
        RequestMethod::Head => Method::HEAD,
        RequestMethod::Get => Method::GET,
    }
}

fn snapshot(response: &Response, final_url: Url, redirects: Vec<RedirectHop>) -> ResponseSnapshot {
    ResponseSnapshot {
        url: final_url,
        status: response.status().as_u16(),
        status_text: response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
        headers: header_map(response.headers()),
        redirects,
    }
}

fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

/// Converts a header map to lowercased name/value pairs
fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_lowercase(), value.to_string()))
        })
        .collect()
}

/// Reduces a transport error to cloneable data with a recognized code
pub(crate) fn classify_error(error: &reqwest::Error) -> RequestFailure {
    RequestFailure {
        message: error.to_string(),
        errno: errno_code(error),
    }
}

fn errno_code(error: &reqwest::Error) -> Option<&'static str> {
    if error.is_timeout() {
        return Some("ETIMEDOUT");
    }

    // Look for an io error anywhere in the chain
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            return match io.kind() {
                ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
                ErrorKind::ConnectionReset => Some("ECONNRESET"),
                ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
                ErrorKind::TimedOut => Some("ETIMEDOUT"),
                _ => None,
            };
        }
        source = inner.source();
    }

    if error.is_connect() {
        let message = error.to_string();
        if message.contains("dns") || message.contains("resolve") {
            Some("ENOTFOUND")
        } else {
            Some("ECONNREFUSED")
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_header_map_lowercases_names() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("text/html"));
        headers.insert("X-Robots-Tag", HeaderValue::from_static("noindex"));

        let map = header_map(&headers);
        assert_eq!(map.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(map.get("x-robots-tag").map(String::as_str), Some("noindex"));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(404), "Not Found");
        assert_eq!(status_text(301), "Moved Permanently");
    }

    #[test]
    fn test_snapshot_success_range() {
        let snapshot = ResponseSnapshot {
            url: Url::parse("https://example.com/").unwrap(),
            status: 204,
            status_text: String::new(),
            headers: HashMap::new(),
            redirects: Vec::new(),
        };
        assert!(snapshot.is_success());

        let snapshot = ResponseSnapshot {
            status: 301,
            ..snapshot
        };
        assert!(!snapshot.is_success());
    }

    #[test]
    fn test_hop_snapshot_has_no_chain() {
        let hop = RedirectHop {
            url: Url::parse("https://example.com/old").unwrap(),
            status: 301,
            headers: HashMap::new(),
        };
        let snapshot = ResponseSnapshot::from_hop(&hop);
        assert_eq!(snapshot.status, 301);
        assert_eq!(snapshot.status_text, "Moved Permanently");
        assert!(snapshot.redirects.is_empty());
    }
}
