//! Robots.txt wrapper
//!
//! A thin layer over the robotstxt crate with a permissive fallback for
//! sites whose robots.txt cannot be fetched or parsed.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt for one site origin
#[derive(Debug, Clone)]
pub struct RobotsTxt {
    /// Raw robots.txt content (empty means allow all)
    content: String,
    /// Whether to allow everything regardless of content
    allow_all: bool,
}

impl RobotsTxt {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// A permissive instance that allows everything
    ///
    /// Used when robots.txt cannot be fetched; connectivity problems are
    /// deferred to the first page fetch rather than failing the site.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks whether a URL is allowed for the given user-agent
    pub fn is_allowed(&self, user_agent: &str, url: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        // Parse and match on demand
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = RobotsTxt::allow_all();
        assert!(robots.is_allowed("TestBot", "/any/path"));
        assert!(robots.is_allowed("TestBot", "/admin"));
    }

    #[test]
    fn test_disallow_all() {
        let robots = RobotsTxt::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("TestBot", "/"));
        assert!(!robots.is_allowed("TestBot", "/page"));
    }

    #[test]
    fn test_disallow_specific_path() {
        let robots = RobotsTxt::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("TestBot", "/"));
        assert!(robots.is_allowed("TestBot", "/page"));
        assert!(!robots.is_allowed("TestBot", "/admin"));
        assert!(!robots.is_allowed("TestBot", "/admin/users"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let robots =
            RobotsTxt::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("TestBot", "/private"));
        assert!(robots.is_allowed("TestBot", "/private/public"));
    }

    #[test]
    fn test_specific_user_agent() {
        let robots =
            RobotsTxt::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(robots.is_allowed("GoodBot", "/page"));
        assert!(!robots.is_allowed("BadBot", "/page"));
    }

    #[test]
    fn test_empty_content_allows() {
        let robots = RobotsTxt::from_content("");
        assert!(robots.is_allowed("TestBot", "/any"));
    }
}
