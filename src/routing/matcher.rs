//! Path pattern matching.
//!
//! # Responsibilities
//! - Classify a registered pattern as exact or prefix
//! - Match a request path against a pattern
//!
//! # Design Decisions
//! - A pattern ending in `/` is a prefix pattern and matches every path
//!   that starts with it; any other pattern matches only the identical path
//! - Matching is case-sensitive and byte-wise
//! - No regex, no wildcards

use crate::routing::RoutingError;

/// A registered URL path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches only the identical path.
    Exact(String),
    /// Matches any path starting with this prefix (which ends with `/`).
    Prefix(String),
}

impl Pattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        if pattern.is_empty() {
            return Err(RoutingError::EmptyPattern);
        }
        if !pattern.starts_with('/') {
            return Err(RoutingError::InvalidPattern(pattern.to_string()));
        }
        if pattern.ends_with('/') {
            Ok(Pattern::Prefix(pattern.to_string()))
        } else {
            Ok(Pattern::Exact(pattern.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Exact(p) | Pattern::Prefix(p) => p,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Pattern::Prefix(_))
    }

    /// Returns true if `path` is served by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Exact(p) => p == path,
            Pattern::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
