//! Link data model and URL resolution
//!
//! A [`Link`] represents one discovered or enqueued reference together with
//! its resolution state, HTML provenance, HTTP outcome and verdict. The
//! `rebased` URL (resolved against the effective `<base>` of the page) is
//! the sole key used for caching, deduplication and visited-page tracking.

pub mod matcher;
pub mod reason;
pub mod tags;

pub use matcher::match_url;
pub use reason::{BrokenReason, ExcludedReason};

use crate::http::ResponseSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// The URLs a link passes through while being resolved and checked
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkUrl {
    /// Raw string exactly as found in the document or passed by the caller
    pub original: String,

    /// `original` resolved against the page's URL
    pub resolved: Option<Url>,

    /// `original` resolved against the effective HTML `<base>`; the
    /// canonical checking key
    pub rebased: Option<Url>,

    /// Final URL after following HTTP redirects, when they led elsewhere
    pub redirected: Option<Url>,
}

/// The base URL used for resolution, dual-valued like the link itself
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkBase {
    /// The page URL
    pub resolved: Option<Url>,

    /// The page URL joined with the document's `<base href>`, if any
    pub rebased: Option<Url>,
}

/// Where in the HTML document a link was found
#[derive(Debug, Clone, Serialize)]
pub struct LinkHtml {
    /// Element name, e.g. `a`
    pub tag_name: String,

    /// Attribute the URL came from, e.g. `href`
    pub attr_name: String,

    /// All attributes on the element
    pub attrs: HashMap<String, String>,

    /// Serialized start tag
    pub tag: String,

    /// Condensed visible text of the element, if it has child nodes
    pub text: Option<String>,

    /// Document-order index among all extracted links
    pub index: usize,

    /// Index among checked links (junk) or among junk links (excluded);
    /// assigned during exclusion classification
    pub offset_index: Option<usize>,

    /// CSS-like selector path locating the element
    pub selector: String,

    /// The `<base href>` value in effect for the document, if any
    pub base_href: Option<String>,
}

/// The HTTP outcome of checking a link
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkHttp {
    /// Response snapshot, absent when the check failed at transport level
    pub response: Option<ResponseSnapshot>,

    /// Whether this outcome was served from the response cache
    pub cached: bool,
}

/// One discovered or enqueued reference and everything known about it
///
/// Created empty by the scrape step, populated by resolution, then
/// progressively filled by exclusion checks and/or the checking engine.
/// Never mutated after the corresponding signal fires.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Link {
    pub url: LinkUrl,
    pub base: LinkBase,

    /// HTML provenance; absent for URLs enqueued directly
    pub html: Option<LinkHtml>,

    pub http: LinkHttp,

    /// Same scheme+host+port as the effective base
    pub internal: Option<bool>,

    /// Internal and same path+query as the effective base (fragment-only
    /// differences still count as the same page)
    pub same_page: Option<bool>,

    pub broken: Option<bool>,
    pub broken_reason: Option<BrokenReason>,

    pub excluded: Option<bool>,
    pub excluded_reason: Option<ExcludedReason>,
}

impl Link {
    /// Returns a zero-valued link with all nullable fields unset
    pub fn new() -> Self {
        Link::default()
    }

    /// Resolves a bare URL with no base; relative input yields no `rebased`
    pub fn from_url(raw_url: &str) -> Self {
        let mut link = Link::new();
        link.resolve(raw_url, None, None);
        link
    }

    /// Computes the resolved/rebased URLs and the internal/same-page flags
    ///
    /// An unparseable `raw_url` is not an error: it leaves `rebased` unset,
    /// which the checking engine reports as `BLC_INVALID`.
    pub fn resolve(&mut self, raw_url: &str, base_url: Option<&Url>, html_base: Option<&str>) {
        self.url.original = raw_url.to_string();

        self.base.resolved = base_url.cloned();
        self.base.rebased = match (base_url, html_base) {
            // An unparseable <base href> falls back to the page URL
            (Some(base), Some(html_base)) => base.join(html_base).ok().or_else(|| Some(base.clone())),
            (Some(base), None) => Some(base.clone()),
            (None, _) => None,
        };

        self.url.resolved = match base_url {
            Some(base) => base.join(raw_url).ok(),
            None => Url::parse(raw_url).ok(),
        };
        self.url.rebased = match &self.base.rebased {
            Some(base) => base.join(raw_url).ok(),
            None => self.url.resolved.clone(),
        };

        self.recompute_relation();
    }

    /// Records the final URL after HTTP redirects and recomputes the
    /// internal/same-page flags against it, since the effective
    /// destination changed
    pub fn redirect(&mut self, new_url: Url) {
        self.url.redirected = Some(new_url);
        self.recompute_relation();
    }

    /// Host portion of the checking key, used for per-host rate limiting
    pub(crate) fn host_key(&self) -> Option<String> {
        self.url
            .rebased
            .as_ref()
            .and_then(|url| url.host_str())
            .map(str::to_string)
    }

    fn recompute_relation(&mut self) {
        let effective = self.url.redirected.as_ref().or(self.url.rebased.as_ref());

        match (effective, &self.base.rebased) {
            (Some(target), Some(base)) => {
                let internal = same_origin(target, base);
                self.internal = Some(internal);
                self.same_page =
                    Some(internal && target.path() == base.path() && target.query() == base.query());
            }
            _ => {
                self.internal = None;
                self.same_page = None;
            }
        }
    }
}

/// Whether two URLs share scheme, host and port
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Whether two URLs name the same resource at the path level
///
/// Equal scheme+host+port+path means "not a redirect": query or fragment
/// differences alone do not count as having been redirected.
pub(crate) fn is_same_resource(a: &Url, b: &Url) -> bool {
    same_origin(a, b) && a.path() == b.path()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        let mut link = Link::new();
        link.resolve("other.html", Some(&base()), None);
        assert_eq!(
            link.url.resolved.as_ref().unwrap().as_str(),
            "https://example.com/dir/other.html"
        );
        assert_eq!(link.url.rebased, link.url.resolved);
        assert_eq!(link.internal, Some(true));
        assert_eq!(link.same_page, Some(false));
    }

    #[test]
    fn test_resolve_absolute_external() {
        let mut link = Link::new();
        link.resolve("https://other.org/", Some(&base()), None);
        assert_eq!(link.internal, Some(false));
        assert_eq!(link.same_page, Some(false));
    }

    #[test]
    fn test_resolve_with_html_base() {
        let mut link = Link::new();
        link.resolve("file.html", Some(&base()), Some("https://cdn.example.org/assets/"));
        assert_eq!(
            link.url.resolved.as_ref().unwrap().as_str(),
            "https://example.com/dir/file.html"
        );
        assert_eq!(
            link.url.rebased.as_ref().unwrap().as_str(),
            "https://cdn.example.org/assets/file.html"
        );
        // Internal is judged against the rebased base
        assert_eq!(link.internal, Some(true));
    }

    #[test]
    fn test_resolve_with_relative_html_base() {
        let mut link = Link::new();
        link.resolve("file.html", Some(&base()), Some("sub/"));
        assert_eq!(
            link.url.rebased.as_ref().unwrap().as_str(),
            "https://example.com/dir/sub/file.html"
        );
    }

    #[test]
    fn test_fragment_only_is_same_page() {
        let mut link = Link::new();
        link.resolve("#section", Some(&base()), None);
        assert_eq!(link.internal, Some(true));
        assert_eq!(link.same_page, Some(true));
    }

    #[test]
    fn test_query_differs_not_same_page() {
        let mut link = Link::new();
        link.resolve("page.html?tab=2", Some(&base()), None);
        assert_eq!(link.internal, Some(true));
        assert_eq!(link.same_page, Some(false));
    }

    #[test]
    fn test_unparseable_url_is_not_an_error() {
        let mut link = Link::new();
        link.resolve("http://", Some(&base()), None);
        assert!(link.url.rebased.is_none());
        assert_eq!(link.internal, None);
        assert_eq!(link.same_page, None);
    }

    #[test]
    fn test_from_url_requires_absolute() {
        let link = Link::from_url("relative/path");
        assert!(link.url.rebased.is_none());

        let link = Link::from_url("https://example.com/");
        assert_eq!(
            link.url.rebased.as_ref().unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_redirect_recomputes_relation() {
        let mut link = Link::new();
        link.resolve("/page", Some(&base()), None);
        assert_eq!(link.internal, Some(true));

        link.redirect(Url::parse("https://elsewhere.net/page").unwrap());
        assert_eq!(link.internal, Some(false));
        assert_eq!(link.same_page, Some(false));
    }

    #[test]
    fn test_same_origin_default_ports() {
        let a = Url::parse("https://example.com/").unwrap();
        let b = Url::parse("https://example.com:443/x").unwrap();
        assert!(same_origin(&a, &b));

        let c = Url::parse("https://example.com:8443/").unwrap();
        assert!(!same_origin(&a, &c));
    }

    #[test]
    fn test_same_resource_threshold() {
        let a = Url::parse("https://example.com/page?x=1").unwrap();
        let b = Url::parse("https://example.com/page#top").unwrap();
        let c = Url::parse("https://example.com/other").unwrap();
        assert!(is_same_resource(&a, &b));
        assert!(!is_same_resource(&a, &c));
    }

    #[test]
    fn test_host_key() {
        let link = Link::from_url("https://example.com/page");
        assert_eq!(link.host_key().as_deref(), Some("example.com"));

        let link = Link::from_url("not a url");
        assert_eq!(link.host_key(), None);
    }
}
