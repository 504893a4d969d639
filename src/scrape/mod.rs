//! HTML scraping
//!
//! Extracts every link-bearing attribute the whitelist recognizes from a
//! parsed document, in document order, building [`Link`]s annotated with
//! their HTML provenance. Also collects the document preliminaries: the
//! first `<base href>` and any robots meta directives.
//!
//! Traversal is iterative (the tree iterators walk an explicit structure,
//! not the call stack), so deeply nested documents cannot overflow.

use crate::link::{tags, Link, LinkHtml};
use crate::robots::{is_bot_token, RobotDirectives};
use scraper::node::Element;
use scraper::{Html, Node};
use std::collections::HashMap;
use url::Url;

/// Scrapes a parsed document for links
///
/// Robots meta tags are fed into `robots` while walking; `<meta
/// name="description">` and `<meta name="keywords">` are explicitly
/// skipped. Links are returned in document order with their `html.index`
/// already assigned.
pub fn scrape_html(
    document: &Html,
    page_url: &Url,
    robots: Option<&mut RobotDirectives>,
) -> Vec<Link> {
    let base_href = find_preliminaries(document, robots);
    let mut links = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(element) = node.value().as_element() else {
            continue;
        };
        let tag_name = element.name();

        for (attr_name, attr_value) in element.attrs() {
            if !tags::recognized(tag_name, attr_name) {
                continue;
            }

            let urls = extract_urls(element, attr_name, attr_value);
            if urls.is_empty() {
                continue;
            }

            // Computed once per element, shared by its links
            let selector = selector_path(node);
            let tag = stringify_element(element);
            let text = element_text(node);
            let attrs: HashMap<String, String> = element
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();

            for url in urls {
                let mut link = Link::new();
                link.html = Some(LinkHtml {
                    tag_name: tag_name.to_string(),
                    attr_name: attr_name.to_string(),
                    attrs: attrs.clone(),
                    tag: tag.clone(),
                    text: text.clone(),
                    index: links.len(),
                    offset_index: None,
                    selector: selector.clone(),
                    base_href: base_href.clone(),
                });
                link.resolve(&url, Some(page_url), base_href.as_deref());
                links.push(link);
            }
        }
    }

    tracing::debug!(count = links.len(), page = %page_url, "scraped links");
    links
}

/// Pulls the URL(s) out of one supported attribute
fn extract_urls(element: &Element, attr_name: &str, attr_value: &str) -> Vec<String> {
    match attr_name {
        "content" => {
            // Only `<meta http-equiv="refresh">` carries a URL
            let refresh = element
                .attr("http-equiv")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("refresh"));
            if refresh {
                parse_meta_refresh(attr_value).into_iter().collect()
            } else {
                Vec::new()
            }
        }
        "ping" => attr_value
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect(),
        "srcset" => parse_srcset(attr_value),
        _ => {
            // A valid URL potentially surrounded by spaces
            vec![attr_value.trim().to_string()]
        }
    }
}

/// Finds the first `<base href>` and feeds robots metas into the aggregate
fn find_preliminaries(document: &Html, robots: Option<&mut RobotDirectives>) -> Option<String> {
    let want_robots = robots.is_some();
    let mut robots = robots;
    let mut base: Option<String> = None;

    for node in document.tree.root().descendants() {
        let Some(element) = node.value().as_element() else {
            continue;
        };

        match element.name() {
            // `<base>` can be anywhere, not just within `<head>`; only the
            // first one with an `href` counts
            "base" => {
                if base.is_none() {
                    if let Some(href) = element.attr("href") {
                        base = Some(href.trim().to_string());
                    }
                }
            }
            "meta" => {
                if let Some(robots) = robots.as_deref_mut() {
                    if let (Some(name), Some(content)) =
                        (element.attr("name"), element.attr("content"))
                    {
                        let name = name.trim().to_lowercase();
                        match name.as_str() {
                            "description" | "keywords" => {}
                            _ => {
                                if name == "robots" || is_bot_token(&name) {
                                    robots.meta(&name, content);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }

        if base.is_some() && !want_robots {
            break;
        }
    }

    base
}

/// Parses the URL out of a `refresh` content value like `"5; url=next.html"`
fn parse_meta_refresh(content: &str) -> Option<String> {
    for part in content.split(';') {
        if let Some((key, value)) = part.split_once('=') {
            if key.trim().eq_ignore_ascii_case("url") {
                let value = value.trim();
                let value = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                    .unwrap_or(value);
                if value.is_empty() {
                    return None;
                }
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Extracts the candidate URLs from a `srcset` descriptor list
fn parse_srcset(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds a CSS-like selector path locating `node`
///
/// `html`, `head` and `body` occur at most once and carry no ordinal.
fn selector_path(node: ego_tree::NodeRef<'_, Node>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(node);

    while let Some(ancestor) = current {
        if let Some(element) = ancestor.value().as_element() {
            let name = element.name();
            if name == "html" || name == "head" || name == "body" {
                parts.push(name.to_string());
            } else {
                parts.push(format!("{}:nth-child({})", name, nth_child_index(ancestor)));
            }
        }
        current = ancestor.parent();
    }

    parts.reverse();
    parts.join(" > ")
}

/// One-based index among element siblings, as `:nth-child()` counts
fn nth_child_index(node: ego_tree::NodeRef<'_, Node>) -> usize {
    node.prev_siblings()
        .filter(|sibling| sibling.value().is_element())
        .count()
        + 1
}

/// Condensed visible text of an element, when it has child nodes
fn element_text(node: ego_tree::NodeRef<'_, Node>) -> Option<String> {
    node.children().next()?;

    let mut text = String::new();
    for descendant in node.descendants() {
        if let Node::Text(fragment) = descendant.value() {
            text.push_str(&fragment);
        }
    }
    Some(condense_whitespace(&text))
}

/// Serializes an element's start tag
fn stringify_element(element: &Element) -> String {
    let mut result = format!("<{}", element.name());
    for (name, value) in element.attrs() {
        result.push_str(&format!(" {}=\"{}\"", name, value));
    }
    result.push('>');
    result
}

fn condense_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    fn scrape(html: &str) -> Vec<Link> {
        let document = Html::parse_document(html);
        scrape_html(&document, &page_url(), None)
    }

    #[test]
    fn test_extracts_anchors_in_document_order() {
        let links = scrape(
            r#"<html><body>
            <a href="/one">One</a>
            <p><a href="/two">Two</a></p>
            </body></html>"#,
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url.original, "/one");
        assert_eq!(links[1].url.original, "/two");
        assert_eq!(links[0].html.as_ref().unwrap().index, 0);
        assert_eq!(links[1].html.as_ref().unwrap().index, 1);
    }

    #[test]
    fn test_resolves_against_page() {
        let links = scrape(r#"<html><body><a href="other.html">x</a></body></html>"#);
        assert_eq!(
            links[0].url.rebased.as_ref().unwrap().as_str(),
            "https://example.com/dir/other.html"
        );
    }

    #[test]
    fn test_first_base_wins() {
        let links = scrape(
            r#"<html><head>
            <base target="_blank">
            <base href="https://cdn.example.org/a/">
            <base href="https://ignored.example.org/">
            </head><body><a href="x.html">x</a></body></html>"#,
        );
        let html = links[0].html.as_ref().unwrap();
        assert_eq!(html.base_href.as_deref(), Some("https://cdn.example.org/a/"));
        assert_eq!(
            links[0].url.rebased.as_ref().unwrap().as_str(),
            "https://cdn.example.org/a/x.html"
        );
        assert_eq!(
            links[0].url.resolved.as_ref().unwrap().as_str(),
            "https://example.com/dir/x.html"
        );
    }

    #[test]
    fn test_meta_refresh() {
        let links = scrape(
            r#"<html><head><meta http-equiv="refresh" content="5; url=next.html"></head></html>"#,
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url.original, "next.html");
        assert_eq!(
            links[0].url.rebased.as_ref().unwrap().as_str(),
            "https://example.com/dir/next.html"
        );
    }

    #[test]
    fn test_meta_without_refresh_is_skipped() {
        let links = scrape(r#"<html><head><meta name="viewport" content="width=1"></head></html>"#);
        assert!(links.is_empty());
    }

    #[test]
    fn test_ping_list() {
        let links =
            scrape(r#"<html><body><a href="/x" ping="/p1, /p2">x</a></body></html>"#);
        let originals: Vec<&str> = links.iter().map(|l| l.url.original.as_str()).collect();
        assert_eq!(originals, vec!["/x", "/p1", "/p2"]);
    }

    #[test]
    fn test_srcset_descriptor_list() {
        let links = scrape(
            r#"<html><body><img src="a.jpg" srcset="b.jpg 1x, c.jpg 2x"></body></html>"#,
        );
        let originals: Vec<&str> = links.iter().map(|l| l.url.original.as_str()).collect();
        assert_eq!(originals, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_robots_meta_feeds_aggregate() {
        let document = Html::parse_document(
            r#"<html><head>
            <meta name="description" content="noindex">
            <meta name="robots" content="noindex, nofollow">
            </head></html>"#,
        );
        let mut robots = RobotDirectives::new("linkrot/1.0");
        scrape_html(&document, &page_url(), Some(&mut robots));
        assert!(robots.is(crate::robots::RobotDirective::NoIndex));
        assert!(robots.is(crate::robots::RobotDirective::NoFollow));
    }

    #[test]
    fn test_description_meta_is_not_a_directive() {
        let document = Html::parse_document(
            r#"<html><head><meta name="description" content="noindex"></head></html>"#,
        );
        let mut robots = RobotDirectives::new("linkrot/1.0");
        scrape_html(&document, &page_url(), Some(&mut robots));
        assert!(!robots.is(crate::robots::RobotDirective::NoIndex));
    }

    #[test]
    fn test_provenance_metadata() {
        let links = scrape(
            r#"<html><body><p><a href="/x" rel="nofollow">  Click   here </a></p></body></html>"#,
        );
        let html = links[0].html.as_ref().unwrap();
        assert_eq!(html.tag_name, "a");
        assert_eq!(html.attr_name, "href");
        assert_eq!(html.attrs.get("rel").map(String::as_str), Some("nofollow"));
        assert_eq!(html.text.as_deref(), Some("Click here"));
        assert!(html.tag.starts_with("<a "));
        assert_eq!(html.selector, "html > body > p:nth-child(1) > a:nth-child(1)");
    }

    #[test]
    fn test_parse_meta_refresh_variants() {
        assert_eq!(parse_meta_refresh("5; url=next.html").as_deref(), Some("next.html"));
        assert_eq!(parse_meta_refresh("0;URL='next.html'").as_deref(), Some("next.html"));
        assert_eq!(
            parse_meta_refresh(r#"1; url="a b.html""#).as_deref(),
            Some("a b.html")
        );
        assert_eq!(parse_meta_refresh("5"), None);
        assert_eq!(parse_meta_refresh("5; url="), None);
    }

    #[test]
    fn test_filter_level_does_not_limit_extraction() {
        // Scraping always uses the maximal whitelist; levels only decide
        // junk classification later
        let links = scrape(r#"<html><body background="bg.png"><q cite="/src">q</q></body></html>"#);
        let originals: Vec<&str> = links.iter().map(|l| l.url.original.as_str()).collect();
        assert_eq!(originals, vec!["bg.png", "/src"]);
    }
}
