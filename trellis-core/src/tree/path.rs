//! Dot paths.
//!
//! A [`Path`] is a validated dot-separated key such as `window.width`. It is
//! stored as a single shared string, so cloning is a reference-count bump
//! and hashing is the same as hashing the `&str`. That lets the leaf cache
//! answer `get("window.width")` by looking up the raw string without
//! splitting or allocating.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StoreError};

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// An ordered, non-empty sequence of non-empty segments.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    raw: Arc<str>,
}

impl Path {
    /// Parse a dot-notation key.
    pub fn parse(input: &str) -> Result<Self> {
        validate(input)?;
        Ok(Self { raw: Arc::from(input) })
    }

    /// Wrap a string whose segments were validated elsewhere.
    pub(crate) fn from_trusted(raw: String) -> Self {
        debug_assert!(validate(&raw).is_ok(), "untrusted path '{raw}'");
        Self { raw: Arc::from(raw) }
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = String::new();
        for (i, segment) in segments.into_iter().enumerate() {
            if i > 0 {
                raw.push(SEPARATOR);
            }
            raw.push_str(segment.as_ref());
        }
        Self::parse(&raw)
    }

    /// The dotted form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Iterate over the segments, root first.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.raw.split(SEPARATOR)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.raw.matches(SEPARATOR).count() + 1
    }

    /// Always false; a path has at least one segment.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The first segment.
    pub fn first(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// The last segment.
    pub fn last(&self) -> &str {
        match self.raw.rfind(SEPARATOR) {
            Some(idx) => &self.raw[idx + 1..],
            None => &self.raw,
        }
    }

    /// The enclosing path, or `None` for a top-level key.
    pub fn parent(&self) -> Option<Path> {
        self.raw.rfind(SEPARATOR).map(|idx| Path {
            raw: Arc::from(&self.raw[..idx]),
        })
    }

    /// Every proper ancestor, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> + '_ {
        self.raw
            .char_indices()
            .rev()
            .filter(|(_, c)| *c == SEPARATOR)
            .map(move |(idx, _)| &self.raw[..idx])
    }

    /// Append one or more segments (the argument may itself contain dots).
    pub fn join(&self, rest: &str) -> Result<Path> {
        validate(rest)?;
        let mut raw = String::with_capacity(self.raw.len() + 1 + rest.len());
        raw.push_str(&self.raw);
        raw.push(SEPARATOR);
        raw.push_str(rest);
        Ok(Path { raw: Arc::from(raw) })
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        let (a, b) = (self.as_str(), other.as_str());
        b.len() >= a.len()
            && b.starts_with(a)
            && (b.len() == a.len() || b[a.len()..].starts_with(SEPARATOR))
    }

    /// True when `self` is a strict ancestor of `other`.
    pub fn is_proper_prefix_of(&self, other: &Path) -> bool {
        self.raw.len() < other.raw.len() && self.is_prefix_of(other)
    }
}

fn validate(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(StoreError::InvalidPath {
            path: input.to_string(),
            reason: "path is empty",
        });
    }
    if input.split(SEPARATOR).any(str::is_empty) {
        return Err(StoreError::InvalidPath {
            path: input.to_string(),
            reason: "path contains an empty segment",
        });
    }
    Ok(())
}

impl Borrow<str> for Path {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", &*self.raw)
    }
}

impl TryFrom<&str> for Path {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self> {
        Path::parse(value)
    }
}

impl PartialEq<str> for Path {
    fn eq(&self, other: &str) -> bool {
        &*self.raw == other
    }
}

impl PartialEq<&str> for Path {
    fn eq(&self, other: &&str) -> bool {
        &*self.raw == *other
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Path::parse(&raw).map_err(serde::de::Error::custom)
    }
}
