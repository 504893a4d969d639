//! Verdict reason codes
//!
//! Broken and excluded links carry a machine-readable reason code
//! (`BLC_*`, `HTTP_<status>`, `ERRNO_<code>`). Reasons are data, never
//! errors: no classification aborts a scan.

use serde::Serialize;
use std::fmt;

/// Why a link was judged broken
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum BrokenReason {
    /// The URL was unparseable or its scheme is not accepted
    Invalid,

    /// The transport failed in an unrecognized way
    Unknown,

    /// The response status was outside 200–299
    HttpStatus(u16),

    /// A recognized transport failure, e.g. `ECONNREFUSED`
    Errno(&'static str),
}

impl BrokenReason {
    /// Machine-readable code, e.g. `HTTP_404`
    pub fn code(&self) -> String {
        match self {
            BrokenReason::Invalid => "BLC_INVALID".to_string(),
            BrokenReason::Unknown => "BLC_UNKNOWN".to_string(),
            BrokenReason::HttpStatus(status) => format!("HTTP_{}", status),
            BrokenReason::Errno(code) => format!("ERRNO_{}", code),
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self {
            BrokenReason::Invalid => "Invalid URL".to_string(),
            BrokenReason::Unknown => "Unknown error".to_string(),
            BrokenReason::HttpStatus(status) => format!("HTTP status {}", status),
            BrokenReason::Errno(code) => format!("Connection error: {}", code),
        }
    }
}

impl fmt::Display for BrokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl From<BrokenReason> for String {
    fn from(reason: BrokenReason) -> String {
        reason.code()
    }
}

/// Why a link was excluded from checking
///
/// Exclusions are filtering outcomes, not errors; excluded links surface
/// through the `junk` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ExcludedReason {
    /// Tag/attribute not supported at the configured filter level
    Html,

    /// External link while external links are excluded
    External,

    /// Internal link while internal links are excluded
    Internal,

    /// Link to the same page while same-page links are excluded
    SamePage,

    /// Scheme is in the excluded-scheme set
    Scheme,

    /// URL matched an excluded keyword or glob
    Keyword,

    /// Disallowed by robots directives (meta, header, rel, or robots.txt)
    Robots,

    /// Vetoed by a caller-supplied filter hook
    Custom(String),
}

impl ExcludedReason {
    /// Machine-readable code, e.g. `BLC_KEYWORD`
    pub fn code(&self) -> String {
        match self {
            ExcludedReason::Html => "BLC_HTML".to_string(),
            ExcludedReason::External => "BLC_EXTERNAL".to_string(),
            ExcludedReason::Internal => "BLC_INTERNAL".to_string(),
            ExcludedReason::SamePage => "BLC_SAMEPAGE".to_string(),
            ExcludedReason::Scheme => "BLC_SCHEME".to_string(),
            ExcludedReason::Keyword => "BLC_KEYWORD".to_string(),
            ExcludedReason::Robots => "BLC_ROBOTS".to_string(),
            ExcludedReason::Custom(code) => code.clone(),
        }
    }
}

impl fmt::Display for ExcludedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl From<ExcludedReason> for String {
    fn from(reason: ExcludedReason) -> String {
        reason.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_codes() {
        assert_eq!(BrokenReason::Invalid.code(), "BLC_INVALID");
        assert_eq!(BrokenReason::Unknown.code(), "BLC_UNKNOWN");
        assert_eq!(BrokenReason::HttpStatus(404).code(), "HTTP_404");
        assert_eq!(BrokenReason::Errno("ECONNREFUSED").code(), "ERRNO_ECONNREFUSED");
    }

    #[test]
    fn test_excluded_codes() {
        assert_eq!(ExcludedReason::Html.code(), "BLC_HTML");
        assert_eq!(ExcludedReason::Keyword.code(), "BLC_KEYWORD");
        assert_eq!(ExcludedReason::Robots.code(), "BLC_ROBOTS");
        assert_eq!(
            ExcludedReason::Custom("BLC_PAYWALL".to_string()).code(),
            "BLC_PAYWALL"
        );
    }

    #[test]
    fn test_display_matches_code() {
        assert_eq!(BrokenReason::HttpStatus(500).to_string(), "HTTP_500");
        assert_eq!(ExcludedReason::SamePage.to_string(), "BLC_SAMEPAGE");
    }
}
