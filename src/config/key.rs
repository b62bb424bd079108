//! Case-insensitive, segment-delimited configuration keys.

use std::fmt;

/// Canonical segment delimiter.
pub const DELIMITER: char = ':';

/// A normalized configuration key such as `logging:filepath`.
///
/// Input keys may use `:` or `.` between segments and any letter case;
/// two keys that differ only in those respects compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    /// Parses a key, normalizing delimiters and case.
    ///
    /// Empty segments are dropped, so `a::b` and `a:b` are the same key.
    pub fn parse(raw: &str) -> Self {
        Self::from_segments(raw.split([':', '.']))
    }

    /// Builds a key from individual path segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::new();
        for segment in segments {
            let segment = segment.as_ref().trim();
            if segment.is_empty() {
                continue;
            }
            if !key.is_empty() {
                key.push(DELIMITER);
            }
            key.push_str(&segment.to_lowercase());
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(DELIMITER).filter(|s| !s.is_empty())
    }

    /// Appends a child segment (or dotted sub-path).
    pub fn join(&self, child: &str) -> Self {
        Self::from_segments(self.segments().chain(child.split([':', '.'])))
    }

    /// Returns the remainder of this key below `prefix`, if it lies under it.
    pub fn strip_prefix(&self, prefix: &Key) -> Option<Key> {
        if prefix.is_empty() {
            return Some(self.clone());
        }
        let rest = self.0.strip_prefix(prefix.as_str())?;
        let rest = rest.strip_prefix(DELIMITER)?;
        Some(Key(rest.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::parse(raw)
    }
}
