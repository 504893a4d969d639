//! Merged robots directives
//!
//! Directives arrive from up to three sources that layer onto one
//! aggregate: the `x-robots-tag` response header, then `<meta>` robots
//! tags found while scanning. Each source may target all crawlers
//! (`robots`) or a specific bot token; targeted directives only apply if
//! the configured user-agent matches the token.

use std::collections::HashSet;

/// A single negative robots directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobotDirective {
    NoFollow,
    NoIndex,
    NoImageIndex,
    NoArchive,
    NoCache,
    NoSnippet,
    NoTranslate,
}

/// Bot name tokens recognized in `<meta name>` and header prefixes
const BOT_TOKENS: &[&str] = &[
    "applebot",
    "baiduspider",
    "bingbot",
    "duckduckbot",
    "facebot",
    "googlebot",
    "msnbot",
    "slurp",
    "teoma",
    "twitterbot",
    "yandex",
];

/// Whether a `<meta name>` value denotes a recognized bot
pub fn is_bot_token(name: &str) -> bool {
    let name = name.to_lowercase();
    BOT_TOKENS.iter().any(|token| name.contains(token))
}

/// The directive aggregate for one page
#[derive(Debug, Clone)]
pub struct RobotDirectives {
    user_agent: String,
    flags: HashSet<RobotDirective>,
}

impl RobotDirectives {
    /// Creates an empty aggregate for the given user-agent
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_lowercase(),
            flags: HashSet::new(),
        }
    }

    /// Feeds a `<meta name content>` pair into the aggregate
    ///
    /// `name` is either the literal `robots` or a bot token; targeted
    /// directives are ignored unless the user-agent matches.
    pub fn meta(&mut self, name: &str, content: &str) {
        if self.applies_to(name) {
            self.apply_tokens(content);
        }
    }

    /// Feeds an `x-robots-tag` header value into the aggregate
    ///
    /// Supports the optional `botname: directives` form.
    pub fn header(&mut self, value: &str) {
        if let Some((prefix, rest)) = value.split_once(':') {
            let prefix = prefix.trim();
            // Distinguish a bot-name prefix from directive arguments such
            // as "unavailable_after: <date>"
            if is_bot_token(prefix) || prefix.eq_ignore_ascii_case("robots") {
                if self.applies_to(prefix) {
                    self.apply_tokens(rest);
                }
                return;
            }
        }
        self.apply_tokens(value);
    }

    /// Whether the given directive is in effect
    pub fn is(&self, directive: RobotDirective) -> bool {
        self.flags.contains(&directive)
    }

    /// Whether any of the given directives is in effect
    pub fn one_is(&self, directives: &[RobotDirective]) -> bool {
        directives.iter().any(|directive| self.is(*directive))
    }

    fn applies_to(&self, target: &str) -> bool {
        let target = target.trim().to_lowercase();
        target == "robots" || self.user_agent.contains(&target)
    }

    fn apply_tokens(&mut self, content: &str) {
        for token in content.split(',') {
            let token = token.trim().to_lowercase();
            match token.as_str() {
                "all" => {
                    self.flags.remove(&RobotDirective::NoIndex);
                    self.flags.remove(&RobotDirective::NoFollow);
                }
                "none" => {
                    self.flags.insert(RobotDirective::NoIndex);
                    self.flags.insert(RobotDirective::NoFollow);
                }
                "index" => {
                    self.flags.remove(&RobotDirective::NoIndex);
                }
                "follow" => {
                    self.flags.remove(&RobotDirective::NoFollow);
                }
                "noindex" => {
                    self.flags.insert(RobotDirective::NoIndex);
                }
                "nofollow" => {
                    self.flags.insert(RobotDirective::NoFollow);
                }
                "noimageindex" => {
                    self.flags.insert(RobotDirective::NoImageIndex);
                }
                "noarchive" => {
                    self.flags.insert(RobotDirective::NoArchive);
                }
                "nocache" => {
                    self.flags.insert(RobotDirective::NoCache);
                }
                "nosnippet" => {
                    self.flags.insert(RobotDirective::NoSnippet);
                }
                "notranslate" => {
                    self.flags.insert(RobotDirective::NoTranslate);
                }
                // "unavailable_after: <date>" and unknown tokens
                _ => {}
            }
        }
    }
}
