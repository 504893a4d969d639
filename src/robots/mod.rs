//! Robots exclusion handling
//!
//! Two independent mechanisms feed the checkers: per-page
//! [`RobotDirectives`] merged from `x-robots-tag` headers and robots meta
//! tags, and per-site [`RobotsTxt`] rules fetched from the origin.

mod directives;
mod txt;

pub use directives::{is_bot_token, RobotDirective, RobotDirectives};
pub use txt::RobotsTxt;

use crate::http::HttpClient;
use crate::RequestFailure;
use url::Url;

/// Fetches and parses robots.txt for the origin of `site_url`
///
/// A non-2xx answer yields a permissive instance; only transport failures
/// are reported, and callers are expected to tolerate those too.
pub async fn fetch_robots_txt(
    client: &HttpClient,
    site_url: &Url,
) -> Result<RobotsTxt, RequestFailure> {
    let robots_url = site_url
        .join("/robots.txt")
        .map_err(|error| RequestFailure {
            message: format!("cannot derive robots.txt URL from {}: {}", site_url, error),
            errno: None,
        })?;

    tracing::debug!(url = %robots_url, "fetching robots.txt");
    let (response, body) = client.fetch_text(&robots_url).await?;

    if response.is_success() {
        Ok(RobotsTxt::from_content(&body))
    } else {
        tracing::debug!(status = response.status, "no usable robots.txt, allowing all");
        Ok(RobotsTxt::allow_all())
    }
}
