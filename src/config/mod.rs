//! Checker configuration
//!
//! Options come in as a plain [`CheckerOptions`] struct and are validated
//! once into an immutable [`CheckerConfig`] when a checker is created.
//! Nothing re-reads or re-normalizes options after that point.

use crate::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Link filter level, `0` (least inclusive) through `3` (most inclusive)
///
/// Controls which tag/attribute combinations count as checkable links.
/// See [`crate::link::tags`] for the whitelist each level enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterLevel(u8);

impl FilterLevel {
    /// The most inclusive level
    pub const MAX: FilterLevel = FilterLevel(3);

    /// Creates a filter level, rejecting values above 3
    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if level > 3 {
            return Err(ConfigError::Validation(format!(
                "filter_level must be between 0 and 3, got {}",
                level
            )));
        }
        Ok(FilterLevel(level))
    }

    /// Returns the numeric level
    pub fn get(self) -> u8 {
        self.0
    }
}

/// HTTP method used for link checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    Head,
    Get,
}

impl RequestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Head => "HEAD",
            RequestMethod::Get => "GET",
        }
    }
}

/// Raw checker options, as supplied by the caller
///
/// All fields have defaults; construct with `CheckerOptions::default()` and
/// override what you need, then validate into a [`CheckerConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckerOptions {
    /// URL schemes that are checked at all (anything else is `BLC_INVALID`)
    pub accepted_schemes: Vec<String>,

    /// URL schemes excluded from checking with `BLC_SCHEME`
    pub excluded_schemes: Vec<String>,

    /// Literal substrings or `*`/`?` glob patterns excluding matching URLs
    pub excluded_keywords: Vec<String>,

    /// Exclude links to a different origin than the page
    pub exclude_external_links: bool,

    /// Exclude links to the same origin as the page
    pub exclude_internal_links: bool,

    /// Exclude links that only differ from the page by fragment
    pub exclude_links_to_same_page: bool,

    /// Tag/attribute filter level, 0–3
    pub filter_level: u8,

    /// Honor robots.txt, robots meta tags, `x-robots-tag` and rel=nofollow
    pub honor_robot_exclusions: bool,

    /// Deduplicate requests through the response cache
    pub cache_responses: bool,

    /// How long cached responses stay fresh, measured from insertion
    pub cache_expiry_time: Duration,

    /// Global cap on concurrent link checks
    pub max_sockets: usize,

    /// Per-host cap on concurrent link checks
    pub max_sockets_per_host: usize,

    /// Minimum delay between request dispatches
    pub rate_limit: Duration,

    /// Method used for link checks (pages are always fetched with GET)
    pub request_method: RequestMethod,

    /// Retry a HEAD check once with GET if the server answers 405
    pub retry_405_head: bool,

    /// User-agent header sent with every request
    pub user_agent: String,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            accepted_schemes: vec!["http".to_string(), "https".to_string()],
            excluded_schemes: vec![
                "data".to_string(),
                "geo".to_string(),
                "javascript".to_string(),
                "mailto".to_string(),
                "sms".to_string(),
                "tel".to_string(),
            ],
            excluded_keywords: Vec::new(),
            exclude_external_links: false,
            exclude_internal_links: false,
            exclude_links_to_same_page: false,
            filter_level: 1,
            honor_robot_exclusions: true,
            cache_responses: true,
            cache_expiry_time: Duration::from_secs(3600),
            max_sockets: usize::MAX,
            max_sockets_per_host: 1,
            rate_limit: Duration::ZERO,
            request_method: RequestMethod::Head,
            retry_405_head: false,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Validated, immutable checker configuration
///
/// Built once per checker instance; scheme sets are lowercased here so the
/// checking paths can do plain set lookups.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub accepted_schemes: HashSet<String>,
    pub excluded_schemes: HashSet<String>,
    pub excluded_keywords: Vec<String>,
    pub exclude_external_links: bool,
    pub exclude_internal_links: bool,
    pub exclude_links_to_same_page: bool,
    pub filter_level: FilterLevel,
    pub honor_robot_exclusions: bool,
    pub cache_responses: bool,
    pub cache_expiry_time: Duration,
    pub max_sockets: usize,
    pub max_sockets_per_host: usize,
    pub rate_limit: Duration,
    pub request_method: RequestMethod,
    pub retry_405_head: bool,
    pub user_agent: String,
}

impl CheckerConfig {
    /// Validates raw options into an immutable configuration
    pub fn new(options: CheckerOptions) -> Result<Self, ConfigError> {
        validate(&options)?;

        Ok(Self {
            accepted_schemes: lowercase_set(&options.accepted_schemes),
            excluded_schemes: lowercase_set(&options.excluded_schemes),
            excluded_keywords: options.excluded_keywords,
            exclude_external_links: options.exclude_external_links,
            exclude_internal_links: options.exclude_internal_links,
            exclude_links_to_same_page: options.exclude_links_to_same_page,
            filter_level: FilterLevel::new(options.filter_level)?,
            honor_robot_exclusions: options.honor_robot_exclusions,
            cache_responses: options.cache_responses,
            cache_expiry_time: options.cache_expiry_time,
            max_sockets: options.max_sockets,
            max_sockets_per_host: options.max_sockets_per_host,
            rate_limit: options.rate_limit,
            request_method: options.request_method,
            retry_405_head: options.retry_405_head,
            user_agent: options.user_agent,
        })
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        // Default options always validate
        CheckerConfig::new(CheckerOptions::default()).unwrap()
    }
}

fn lowercase_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// Validates raw checker options
fn validate(options: &CheckerOptions) -> Result<(), ConfigError> {
    if options.accepted_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "accepted_schemes cannot be empty".to_string(),
        ));
    }

    if options.max_sockets < 1 {
        return Err(ConfigError::Validation(format!(
            "max_sockets must be >= 1, got {}",
            options.max_sockets
        )));
    }

    if options.max_sockets_per_host < 1 {
        return Err(ConfigError::Validation(format!(
            "max_sockets_per_host must be >= 1, got {}",
            options.max_sockets_per_host
        )));
    }

    if options.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    FilterLevel::new(options.filter_level)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        let config = CheckerConfig::new(CheckerOptions::default()).unwrap();
        assert!(config.accepted_schemes.contains("http"));
        assert!(config.accepted_schemes.contains("https"));
        assert!(config.excluded_schemes.contains("mailto"));
        assert_eq!(config.filter_level.get(), 1);
        assert_eq!(config.request_method, RequestMethod::Head);
        assert!(config.cache_responses);
    }

    #[test]
    fn test_filter_level_out_of_range() {
        let options = CheckerOptions {
            filter_level: 4,
            ..CheckerOptions::default()
        };
        assert!(matches!(
            CheckerConfig::new(options),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_accepted_schemes_rejected() {
        let options = CheckerOptions {
            accepted_schemes: vec![],
            ..CheckerOptions::default()
        };
        assert!(CheckerConfig::new(options).is_err());
    }

    #[test]
    fn test_zero_sockets_rejected() {
        let options = CheckerOptions {
            max_sockets: 0,
            ..CheckerOptions::default()
        };
        assert!(CheckerConfig::new(options).is_err());

        let options = CheckerOptions {
            max_sockets_per_host: 0,
            ..CheckerOptions::default()
        };
        assert!(CheckerConfig::new(options).is_err());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let options = CheckerOptions {
            user_agent: String::new(),
            ..CheckerOptions::default()
        };
        assert!(CheckerConfig::new(options).is_err());
    }

    #[test]
    fn test_schemes_lowercased() {
        let options = CheckerOptions {
            accepted_schemes: vec!["HTTP".to_string(), "Https".to_string()],
            ..CheckerOptions::default()
        };
        let config = CheckerConfig::new(options).unwrap();
        assert!(config.accepted_schemes.contains("http"));
        assert!(config.accepted_schemes.contains("https"));
    }

    #[test]
    fn test_filter_level_ordering() {
        assert!(FilterLevel::new(0).unwrap() < FilterLevel::new(3).unwrap());
        assert_eq!(FilterLevel::new(3).unwrap(), FilterLevel::MAX);
    }
}
