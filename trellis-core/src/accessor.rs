//! Segment-by-segment access.
//!
//! [`Accessor`] builds a path one segment at a time and reads or writes it
//! through the store, so `store.at("theme").at("light").set("#fff")` is the
//! same write as `store.set("theme.light", "#fff")`. Segments are validated
//! when the path is used, not while it is being built.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::store::Store;
use crate::tree::{Lookup, Path, SEPARATOR};

/// A path under construction, bound to a store.
#[derive(Debug, Clone)]
pub struct Accessor<'a> {
    store: &'a Store,
    path: String,
}

impl<'a> Accessor<'a> {
    pub(crate) fn new(store: &'a Store, segment: &str) -> Self {
        Self {
            store,
            path: segment.to_string(),
        }
    }

    /// Descend one (or more, if dotted) segment.
    pub fn at(mut self, segment: &str) -> Self {
        self.path.push(SEPARATOR);
        self.path.push_str(segment);
        self
    }

    /// The dotted path built so far.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Validate and parse the path built so far.
    pub fn to_path(&self) -> Result<Path> {
        Path::parse(&self.path)
    }

    /// Tracked read, exactly like [`Store::get`].
    pub fn get(&self) -> Result<Lookup> {
        self.store.get(&self.path)
    }

    /// Read a leaf value.
    pub fn value(&self) -> Result<Value> {
        self.store.get_value(&self.path)
    }

    /// Read a leaf and decode it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.store.get_as(&self.path)
    }

    /// Write through the store, with the usual change-only notification.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.store.set(&self.path, value)
    }
}

impl Store {
    /// Start a segment-by-segment path at `segment`.
    pub fn at(&self, segment: &str) -> Accessor<'_> {
        Accessor::new(self, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;

    #[test]
    fn builds_dotted_paths() {
        let store = Store::new();
        let accessor = store.at("window").at("size").at("width");
        assert_eq!(accessor.path(), "window.size.width");
        assert_eq!(accessor.to_path().unwrap(), "window.size.width");
    }

    #[test]
    fn reads_and_writes_through_the_store() {
        let store = Store::new();
        store.at("window").at("width").set(800).unwrap();

        assert_eq!(store.get("window.width").unwrap(), json!(800));
        assert_eq!(store.at("window").at("width").get_as::<u32>().unwrap(), 800);
        assert!(store.at("window").get().unwrap().is_group());
        assert!(store.at("window").at("depth").get().unwrap().is_none());
    }

    #[test]
    fn theme_rules_apply() {
        let store = Store::new();
        store.at("theme").at("dark").at("fg").set("#eee").unwrap();
        store.at("theme").at("light").at("fg").set("#111").unwrap();

        assert_eq!(store.at("theme").at("fg").value().unwrap(), json!("#111"));
        assert!(matches!(
            store.at("theme").at("fg").set("#000"),
            Err(StoreError::AmbiguousThemeWrite { .. })
        ));
    }

    #[test]
    fn empty_segment_fails_on_use() {
        let store = Store::new();
        let accessor = store.at("a").at("");
        assert!(matches!(accessor.get(), Err(StoreError::InvalidPath { .. })));
        assert!(matches!(accessor.set(1), Err(StoreError::InvalidPath { .. })));
    }
}
