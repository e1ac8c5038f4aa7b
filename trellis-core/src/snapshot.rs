//! Snapshots
//!
//! Export the whole tree as a plain nested mapping and merge one back in.
//! A mapping can travel as JSON or MessagePack.
//!
//! Loading is a *merge*, not a replace:
//!
//! - every leaf in the input is written with an ordinary `set`, so unchanged
//!   values stay silent and changed ones notify listeners as usual;
//! - explicit nulls are written like any other value;
//! - an empty mapping creates an empty group if nothing is there yet;
//! - keys absent from the input are never deleted.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::tree::Path;

impl Store {
    /// The entire tree as a nested mapping.
    pub fn to_plain_mapping(&self) -> Map<String, Value> {
        self.with_tree(|tree| tree.to_plain_mapping())
    }

    /// Merge a nested mapping into the store.
    pub fn from_plain_mapping(&self, mapping: &Map<String, Value>) -> Result<()> {
        let written = self.merge(None, mapping)?;
        debug!(leaves = written, "merged plain mapping");
        Ok(())
    }

    /// Compact JSON of the entire tree.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(self.with_tree(|tree| serde_json::to_string(tree.root()))?)
    }

    /// Indented JSON of the entire tree.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(self.with_tree(|tree| serde_json::to_string_pretty(tree.root()))?)
    }

    /// Merge a JSON object into the store.
    pub fn from_json_str(&self, input: &str) -> Result<()> {
        let value: Value = serde_json::from_str(input)?;
        self.merge_value(value)
    }

    /// MessagePack encoding of the entire tree, with named map keys.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(self.with_tree(|tree| rmp_serde::to_vec_named(tree.root()))?)
    }

    /// Merge a MessagePack-encoded mapping into the store.
    pub fn from_msgpack(&self, bytes: &[u8]) -> Result<()> {
        let value: Value = rmp_serde::from_slice(bytes)?;
        self.merge_value(value)
    }

    fn merge_value(&self, value: Value) -> Result<()> {
        match value {
            Value::Object(mapping) => self.from_plain_mapping(&mapping),
            other => Err(StoreError::NotAMapping {
                found: type_name(&other),
            }),
        }
    }

    fn merge(&self, prefix: Option<&Path>, mapping: &Map<String, Value>) -> Result<usize> {
        let mut written = 0;
        for (key, value) in mapping {
            let path = match prefix {
                Some(prefix) => prefix.join(key)?,
                None => Path::parse(key)?,
            };
            match value {
                Value::Object(children) if children.is_empty() => self.ensure_group(&path)?,
                Value::Object(children) => written += self.merge(Some(&path), children)?,
                leaf => {
                    self.set_path(&path, leaf.clone())?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::tree::Lookup;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn plain() -> Store {
        Store::with_config(StoreConfig::without_theme()).unwrap()
    }

    #[test]
    fn mapping_mirrors_the_tree() {
        let store = Store::new();
        store.set("window.width", 800).unwrap();
        store.set("window.title", Value::Null).unwrap();

        assert_eq!(
            Value::Object(store.to_plain_mapping()),
            json!({
                "theme": { "mode": "light", "light": {}, "dark": {} },
                "window": { "width": 800, "title": null }
            })
        );
    }

    #[test]
    fn json_round_trip_keeps_nulls_and_empty_groups() {
        let source = Store::new();
        source.set("theme.light.fg", "#111").unwrap();
        source.set("theme.dark.fg", "#eee").unwrap();
        source.set("editor.font", Value::Null).unwrap();

        let restored = Store::new();
        restored.from_json_str(&source.to_json_string().unwrap()).unwrap();

        assert_eq!(restored.to_plain_mapping(), source.to_plain_mapping());
        assert_eq!(restored.get("editor.font").unwrap(), Lookup::Value(Value::Null));
        assert!(restored.get("editor.font").unwrap().is_value());
    }

    #[test]
    fn msgpack_round_trip() {
        let source = plain();
        source.set("a.b", json!([1, 2, 3])).unwrap();
        source.set("a.c", 1.5).unwrap();
        source.set("d", Value::Null).unwrap();

        let restored = plain();
        restored.from_msgpack(&source.to_msgpack().unwrap()).unwrap();
        assert_eq!(restored.to_plain_mapping(), source.to_plain_mapping());
    }

    #[test]
    fn merge_never_deletes() {
        let store = plain();
        store.set("keep", 1).unwrap();
        store.set("window.width", 800).unwrap();

        store
            .from_json_str(r#"{ "window": { "height": 600 }, "empty": {} }"#)
            .unwrap();

        assert_eq!(
            Value::Object(store.to_plain_mapping()),
            json!({ "keep": 1, "window": { "width": 800, "height": 600 }, "empty": {} })
        );
    }

    #[test]
    fn merge_notifies_changed_leaves_only() {
        let store = plain();
        store.set("a", 1).unwrap();
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.from_json_str(r#"{ "a": 1, "b": 2, "c": {} }"#).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_mapping_leaves_an_existing_leaf_alone() {
        let store = plain();
        store.set("a", 1).unwrap();
        store.from_json_str(r#"{ "a": {} }"#).unwrap();
        assert_eq!(store.get("a").unwrap(), json!(1));
    }

    #[test]
    fn root_must_be_a_mapping() {
        let store = plain();
        assert!(matches!(
            store.from_json_str("[1, 2]"),
            Err(StoreError::NotAMapping { found: "an array" })
        ));
        assert!(matches!(store.from_json_str("{ nope"), Err(StoreError::Decode(_))));
        assert!(matches!(
            store.from_msgpack(&[0xc1]),
            Err(StoreError::MsgpackDecode(_))
        ));
    }

    #[test]
    fn theme_alias_in_input_is_rejected() {
        let store = Store::new();
        assert!(matches!(
            store.from_json_str(r##"{ "theme": { "fg": "#000" } }"##),
            Err(StoreError::AmbiguousThemeWrite { .. })
        ));
    }

    #[test]
    fn pretty_json_is_indented() {
        let store = plain();
        store.set("a.b", 1).unwrap();
        let pretty = store.to_json_pretty().unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&pretty).unwrap(), json!({ "a": { "b": 1 } }));
    }
}
