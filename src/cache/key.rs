//! Cache Key Module
//!
//! Structural, prefix-comparable identifiers for cached query results.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Cache Key ==
/// Ordered tuple of segments identifying one cached query result.
///
/// Keys compare by value: `["user-settings", "u1"]` built twice yields two
/// equal keys. Prefix matching is segment-wise, never by string prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Builds a key from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty key, a prefix of every other key.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// True if every segment of `prefix` matches the leading segments of this key.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for CacheKey {
    fn from(segment: &str) -> Self {
        Self(vec![segment.to_string()])
    }
}

impl<S: Into<String>> From<Vec<S>> for CacheKey {
    fn from(segments: Vec<S>) -> Self {
        Self::new(segments)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{:?}", segment)?;
        }
        write!(f, "]")
    }
}
