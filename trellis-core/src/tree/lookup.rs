//! Read results.
//!
//! A read never fails just because a key is absent. It returns a
//! [`Lookup`], and only *using* a missing result as a value fails. The
//! operations that are always legal on a missing result are:
//!
//! - comparing it against null (`lookup.is_none()` or `lookup == Value::Null`),
//!   which is always true;
//! - taking its [`path`](Missing::path) (or a [`child`](Missing::child) of it)
//!   as the target of a later write.
//!
//! Everything else (`value()`, `try_to_string()`, `deserialize()`) fails with
//! [`StoreError::MissingAccess`]. Arithmetic on a `Lookup` does not compile.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::path::Path;
use crate::error::{Result, StoreError};

/// The result of reading a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The path names a leaf.
    Value(Value),

    /// The path names a group. Further traversal is fine; using it as a
    /// value is not.
    Group(GroupView),

    /// Nothing lives at the path.
    Missing(Missing),
}

impl Lookup {
    /// True for a missing result and for a leaf holding null.
    pub fn is_none(&self) -> bool {
        match self {
            Lookup::Value(value) => value.is_null(),
            Lookup::Group(_) => false,
            Lookup::Missing(_) => true,
        }
    }

    /// True when the path names a leaf.
    pub fn is_value(&self) -> bool {
        matches!(self, Lookup::Value(_))
    }

    /// True when the path names a group.
    pub fn is_group(&self) -> bool {
        matches!(self, Lookup::Group(_))
    }

    /// True when nothing lives at the path.
    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing(_))
    }

    /// Borrow the leaf value.
    pub fn value(&self) -> Result<&Value> {
        match self {
            Lookup::Value(value) => Ok(value),
            Lookup::Group(view) => Err(view.access_error()),
            Lookup::Missing(missing) => Err(missing.access_error()),
        }
    }

    /// Take the leaf value.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Lookup::Value(value) => Ok(value),
            Lookup::Group(view) => Err(view.access_error()),
            Lookup::Missing(missing) => Err(missing.access_error()),
        }
    }

    /// Leaf value as an `Option`, mapping a missing result to `None`.
    ///
    /// A group is still an error: it exists, it just is not a value.
    pub fn into_option(self) -> Result<Option<Value>> {
        match self {
            Lookup::Value(value) => Ok(Some(value)),
            Lookup::Group(view) => Err(view.access_error()),
            Lookup::Missing(_) => Ok(None),
        }
    }

    /// Stringify the leaf. Strings come back without quotes; every other
    /// value uses its JSON form.
    pub fn try_to_string(&self) -> Result<String> {
        Ok(match self.value()? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Decode the leaf into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.value()?)?)
    }

    /// The group view, when the path names a group.
    pub fn as_group(&self) -> Option<&GroupView> {
        match self {
            Lookup::Group(view) => Some(view),
            _ => None,
        }
    }

    /// The missing marker, when nothing lives at the path.
    pub fn as_missing(&self) -> Option<&Missing> {
        match self {
            Lookup::Missing(missing) => Some(missing),
            _ => None,
        }
    }
}

impl PartialEq<Value> for Lookup {
    /// A missing result equals null and nothing else; a group equals nothing.
    fn eq(&self, other: &Value) -> bool {
        match self {
            Lookup::Value(value) => value == other,
            Lookup::Group(_) => false,
            Lookup::Missing(_) => other.is_null(),
        }
    }
}

/// Marker for a read that resolved to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Missing {
    path: Path,
}

impl Missing {
    pub(crate) fn new(path: Path) -> Self {
        Self { path }
    }

    /// The path that was read; a valid write target.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Continue the path for a subsequent write.
    pub fn child(&self, rest: &str) -> Result<Missing> {
        Ok(Missing::new(self.path.join(rest)?))
    }

    fn access_error(&self) -> StoreError {
        StoreError::MissingAccess {
            path: self.path.to_string(),
            found: "nothing at this path",
        }
    }
}

/// Read-only view of a group.
///
/// Holds the group's path and its child names as of the read; use
/// [`child_path`](GroupView::child_path) to keep descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupView {
    path: Path,
    keys: Vec<String>,
}

impl GroupView {
    pub(crate) fn new(path: Path, keys: Vec<String>) -> Self {
        Self { path, keys }
    }

    /// Path of the group.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the group's children at the time of the read.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the group has no children.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True when the group has a child named `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Path of a child, for a follow-up read.
    pub fn child_path(&self, rest: &str) -> Result<Path> {
        self.path.join(rest)
    }

    fn access_error(&self) -> StoreError {
        StoreError::MissingAccess {
            path: self.path.to_string(),
            found: "a group, not a value",
        }
    }
}
