//! Link-bearing tag/attribute whitelist
//!
//! Each filter level is a superset of the one below it, so a combination
//! is supported at level N iff its minimal level is <= N. Scraping always
//! extracts at the maximal level; the configured level only decides which
//! extracted links are checked rather than reported as junk.
//!
//! The recursive table is the subset whose targets are expected to be
//! HTML pages; the site crawler only follows links it supports.

use crate::config::FilterLevel;

/// Minimal filter level at which a tag/attribute combination is checked
fn min_level(tag: &str, attr: &str) -> Option<u8> {
    let level = match (tag, attr) {
        ("a" | "area", "href") => 0,

        ("audio" | "embed" | "iframe" | "img" | "input" | "source" | "track" | "video", "src") => 1,
        ("img" | "source", "srcset") => 1,
        ("menuitem", "icon") => 1,
        ("meta", "content") => 1,
        ("object", "data") => 1,
        ("video", "poster") => 1,

        ("a" | "area", "ping") => 2,
        ("form", "action") => 2,
        ("link", "href") => 2,
        ("script", "src") => 2,

        ("applet", "archive" | "code") => 3,
        ("blockquote" | "del" | "ins" | "q", "cite") => 3,
        ("body" | "table" | "td" | "th" | "tr", "background") => 3,
        ("frame", "src" | "longdesc") => 3,
        ("head", "profile") => 3,
        ("html", "manifest") => 3,
        ("iframe" | "img", "longdesc") => 3,

        _ => return None,
    };
    Some(level)
}

/// Minimal level in the recursive (page-following) table
fn min_level_recursive(tag: &str, attr: &str) -> Option<u8> {
    let level = match (tag, attr) {
        ("a" | "area", "href") => 0,
        ("iframe", "src") => 1,
        ("meta", "content") => 1,
        ("form", "action") => 2,
        ("frame", "src") => 3,
        _ => return None,
    };
    Some(level)
}

/// Whether a tag/attribute combination is checked at the given level
pub fn supported(level: FilterLevel, tag: &str, attr: &str) -> bool {
    min_level(tag, attr).is_some_and(|min| min <= level.get())
}

/// Whether the whitelist recognizes the combination at any level
pub fn recognized(tag: &str, attr: &str) -> bool {
    min_level(tag, attr).is_some()
}

/// Whether the site crawler may follow links from this combination
pub fn supported_recursive(level: FilterLevel, tag: &str, attr: &str) -> bool {
    min_level_recursive(tag, attr).is_some_and(|min| min <= level.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(n: u8) -> FilterLevel {
        FilterLevel::new(n).unwrap()
    }

    #[test]
    fn test_level_zero_is_anchors_only() {
        assert!(supported(level(0), "a", "href"));
        assert!(supported(level(0), "area", "href"));
        assert!(!supported(level(0), "img", "src"));
        assert!(!supported(level(0), "link", "href"));
    }

    #[test]
    fn test_level_one_adds_media() {
        assert!(supported(level(1), "img", "src"));
        assert!(supported(level(1), "img", "srcset"));
        assert!(supported(level(1), "video", "poster"));
        assert!(supported(level(1), "meta", "content"));
        assert!(!supported(level(1), "form", "action"));
    }

    #[test]
    fn test_level_two_adds_forms_and_resources() {
        assert!(supported(level(2), "form", "action"));
        assert!(supported(level(2), "link", "href"));
        assert!(supported(level(2), "script", "src"));
        assert!(supported(level(2), "a", "ping"));
        assert!(!supported(level(2), "frame", "src"));
    }

    #[test]
    fn test_level_three_adds_uncommon() {
        assert!(supported(level(3), "frame", "src"));
        assert!(supported(level(3), "blockquote", "cite"));
        assert!(supported(level(3), "body", "background"));
        assert!(supported(level(3), "html", "manifest"));
    }

    #[test]
    fn test_unrecognized_combinations() {
        assert!(!recognized("div", "data-url"));
        assert!(!recognized("a", "title"));
        assert!(!supported(level(3), "span", "href"));
    }

    #[test]
    fn test_levels_are_cumulative() {
        // Every combination supported at level N must be supported at N+1
        let combos = [
            ("a", "href"),
            ("img", "src"),
            ("meta", "content"),
            ("form", "action"),
            ("script", "src"),
            ("frame", "src"),
            ("q", "cite"),
        ];
        for n in 0..3u8 {
            for (tag, attr) in combos {
                if supported(level(n), tag, attr) {
                    assert!(
                        supported(level(n + 1), tag, attr),
                        "{}[{}] supported at {} but not {}",
                        tag,
                        attr,
                        n,
                        n + 1
                    );
                }
            }
        }
    }

    #[test]
    fn test_recursive_is_subset() {
        let combos = [
            ("a", "href"),
            ("area", "href"),
            ("iframe", "src"),
            ("meta", "content"),
            ("form", "action"),
            ("frame", "src"),
            ("img", "src"),
            ("script", "src"),
        ];
        for (tag, attr) in combos {
            if supported_recursive(level(3), tag, attr) {
                assert!(supported(level(3), tag, attr));
            }
        }
        // Media links are never followed as pages
        assert!(!supported_recursive(level(3), "img", "src"));
        assert!(!supported_recursive(level(3), "script", "src"));
    }
}
