//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive and segment-aware: `/account` matches
//!   `/account`, `/account/` and `/account/123`, never `/accounting`
//! - The remainder after the prefix is returned verbatim (still percent-encoded)
//! - No regex to guarantee O(n) matching

/// Matches a request path against a route prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A trailing slash is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The part of `path` after the prefix, if the prefix matches.
    pub fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.remainder(path).is_some()
    }

    /// True if some path could match both prefixes.
    pub fn overlaps(&self, other: &PathPrefixMatcher) -> bool {
        self.matches(&other.prefix) || other.matches(&self.prefix)
    }
}
