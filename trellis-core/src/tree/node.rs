//! Tree Nodes
//!
//! This module defines the node types that live in the settings tree and
//! the [`PathTree`] that owns them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::lookup::{GroupView, Lookup, Missing};
use super::path::Path;
use crate::error::{Result, StoreError};

/// Children of a group, keyed by segment name.
pub type Children = IndexMap<String, Node>;

/// A node in the settings tree.
///
/// Serializes untagged: a group becomes a JSON object and a leaf becomes
/// its raw value, so the serialized tree *is* the plain mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// A named collection of child nodes.
    Group(Children),

    /// A single concrete value.
    Leaf(Value),
}

/// What a node is, without its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A group node.
    Group,
    /// A leaf node.
    Leaf,
}

impl Node {
    /// An empty group.
    pub fn group() -> Self {
        Node::Group(Children::new())
    }

    /// Build a node from a value. Objects become groups, recursively;
    /// everything else (null included) becomes a leaf.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Node::Group(
                map.into_iter()
                    .map(|(key, value)| (key, Node::from_value(value)))
                    .collect(),
            ),
            other => Node::Leaf(other),
        }
    }

    /// Materialize this node as a plain value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(value) => value.clone(),
            Node::Group(children) => Value::Object(children_to_map(children)),
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Group(_) => NodeKind::Group,
            Node::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// Child map, if this is a group.
    pub fn children(&self) -> Option<&Children> {
        match self {
            Node::Group(children) => Some(children),
            Node::Leaf(_) => None,
        }
    }

    /// Child map of this node, turning a leaf into an empty group first.
    fn promote(&mut self) -> &mut Children {
        if let Node::Leaf(_) = self {
            *self = Node::group();
        }
        match self {
            Node::Group(children) => children,
            Node::Leaf(_) => unreachable!("leaf was promoted to a group above"),
        }
    }
}

pub(crate) fn children_to_map(children: &Children) -> Map<String, Value> {
    children
        .iter()
        .map(|(key, node)| (key.clone(), node.to_value()))
        .collect()
}

/// Hierarchical storage keyed by dot paths.
///
/// What a [`PathTree::write`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Whether anything observable changed.
    pub changed: bool,
    /// The leaf ancestor that was replaced by a group to make room, if any.
    pub promoted: Option<Path>,
}

/// The root is always a group. The tree owns every node reachable from it;
/// nothing else in the crate holds references into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTree {
    root: Children,
}

impl PathTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root group.
    pub fn root(&self) -> &Children {
        &self.root
    }

    /// True when the tree holds nothing.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Find the node at `path`, if any.
    pub fn node(&self, path: &Path) -> Option<&Node> {
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for segment in segments {
            node = node.children()?.get(segment)?;
        }
        Some(node)
    }

    /// True when `path` resolves to a node of either kind.
    pub fn contains(&self, path: &Path) -> bool {
        self.node(path).is_some()
    }

    /// Resolve `path`.
    ///
    /// Descending through a leaf before the path is exhausted yields a
    /// missing result, exactly like an absent segment.
    pub fn read(&self, path: &Path) -> Lookup {
        match self.node(path) {
            Some(Node::Leaf(value)) => Lookup::Value(value.clone()),
            Some(Node::Group(children)) => {
                Lookup::Group(GroupView::new(path.clone(), children.keys().cloned().collect()))
            }
            None => Lookup::Missing(Missing::new(path.clone())),
        }
    }

    /// Write `value` at `path`, creating intermediate groups as needed.
    ///
    /// Object values replace the node at `path` with a group subtree.
    /// Reports whether anything observable changed and which leaf, if any,
    /// was promoted on the way down. Writing a value equal to the current
    /// one leaves the tree untouched and reports no change.
    pub fn write(&mut self, path: &Path, value: Value, promote_leaves: bool) -> Result<WriteOutcome> {
        let node = Node::from_value(value);

        if let Some(existing) = self.node(path) {
            if *existing == node {
                return Ok(WriteOutcome::default());
            }
            if existing.kind() == NodeKind::Group && node.kind() == NodeKind::Leaf {
                return Err(StoreError::StructuralConflict {
                    path: path.to_string(),
                    conflict_at: path.to_string(),
                    reason: "is a group and cannot be overwritten with a plain value",
                });
            }
        }

        if !promote_leaves {
            if let Some(blocking) = self.leaf_ancestor(path) {
                return Err(StoreError::StructuralConflict {
                    path: path.to_string(),
                    conflict_at: blocking.to_string(),
                    reason: "is already a value, not a group",
                });
            }
        }

        let mut promoted = None;
        let mut group = &mut self.root;
        let mut segments = path.segments().enumerate().peekable();
        while let Some((depth, segment)) = segments.next() {
            if segments.peek().is_none() {
                if node.kind() == NodeKind::Group && group.contains_key(segment) {
                    debug!(path = %path, "replacing subtree");
                }
                group.insert(segment.to_string(), node);
                return Ok(WriteOutcome {
                    changed: true,
                    promoted,
                });
            }

            let child = group.entry(segment.to_string()).or_insert_with(Node::group);
            if child.kind() == NodeKind::Leaf {
                debug!(path = %path, at = segment, "promoting leaf to group");
                let prefix: Vec<&str> = path.segments().take(depth + 1).collect();
                promoted = Some(Path::from_trusted(prefix.join(".")));
            }
            group = child.promote();
        }

        unreachable!("a parsed path has at least one segment")
    }

    /// Make sure a group exists at `path` without touching an existing one.
    ///
    /// Returns true when something was created.
    pub fn ensure_group(&mut self, path: &Path, promote_leaves: bool) -> Result<bool> {
        match self.node(path) {
            Some(Node::Group(_)) => Ok(false),
            Some(Node::Leaf(_)) => Err(StoreError::StructuralConflict {
                path: path.to_string(),
                conflict_at: path.to_string(),
                reason: "is already a value, not a group",
            }),
            None => Ok(self
                .write(path, Value::Object(Map::new()), promote_leaves)?
                .changed),
        }
    }

    /// Put `node` at the top-level `segment`, replacing whatever was there.
    pub(crate) fn graft(&mut self, segment: &str, node: Node) {
        self.root.insert(segment.to_string(), node);
    }

    /// Plain nested mapping of the entire tree.
    pub fn to_plain_mapping(&self) -> Map<String, Value> {
        children_to_map(&self.root)
    }

    /// Nearest ancestor of `path` that is a leaf.
    fn leaf_ancestor(&self, path: &Path) -> Option<String> {
        let mut node = None::<&Node>;
        let mut walked = String::new();
        let count = path.len();
        for (i, segment) in path.segments().enumerate() {
            if i + 1 == count {
                break;
            }
            let children = match node {
                None => &self.root,
                Some(Node::Group(children)) => children,
                Some(Node::Leaf(_)) => return Some(walked),
            };
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            match children.get(segment) {
                Some(child) => node = Some(child),
                None => return None,
            }
        }
        match node {
            Some(Node::Leaf(_)) => Some(walked),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn write_auto_vivifies_groups() {
        let mut tree = PathTree::new();
        assert!(tree.write(&p("a.b.c"), json!(1), true).unwrap().changed);

        assert_eq!(tree.read(&p("a.b.c")), Lookup::Value(json!(1)));
        assert_eq!(tree.node(&p("a.b")).unwrap().kind(), NodeKind::Group);
        assert_eq!(tree.node(&p("a")).unwrap().kind(), NodeKind::Group);
    }

    #[test]
    fn equal_write_reports_no_change() {
        let mut tree = PathTree::new();
        assert!(tree.write(&p("w"), json!(1), true).unwrap().changed);
        let before = tree.clone();

        assert!(!tree.write(&p("w"), json!(1), true).unwrap().changed);
        assert_eq!(tree, before);
        assert!(tree.write(&p("w"), json!(2), true).unwrap().changed);
    }

    #[test]
    fn null_counts_as_a_change_from_missing() {
        let mut tree = PathTree::new();
        assert!(tree.write(&p("k"), Value::Null, true).unwrap().changed);
        assert_eq!(tree.read(&p("k")), Lookup::Value(Value::Null));
        assert!(!tree.write(&p("k"), Value::Null, true).unwrap().changed);
    }

    #[test]
    fn read_through_leaf_is_missing() {
        let mut tree = PathTree::new();
        tree.write(&p("a"), json!(5), true).unwrap();
        assert!(matches!(tree.read(&p("a.b")), Lookup::Missing(_)));
        assert!(matches!(tree.read(&p("zzz")), Lookup::Missing(_)));
    }

    #[test]
    fn read_group_returns_view() {
        let mut tree = PathTree::new();
        tree.write(&p("window.width"), json!(800), true).unwrap();
        tree.write(&p("window.height"), json!(600), true).unwrap();

        match tree.read(&p("window")) {
            Lookup::Group(view) => assert_eq!(view.keys(), ["width", "height"]),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn leaf_is_promoted_when_written_through() {
        let mut tree = PathTree::new();
        tree.write(&p("a"), json!(5), true).unwrap();
        let outcome = tree.write(&p("a.b"), json!(6), true).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.promoted, Some(p("a")));

        assert_eq!(tree.node(&p("a")).unwrap().kind(), NodeKind::Group);
        assert_eq!(tree.read(&p("a.b")), Lookup::Value(json!(6)));
    }

    #[test]
    fn deep_promotion_reports_the_leaf() {
        let mut tree = PathTree::new();
        tree.write(&p("x.y"), json!(1), true).unwrap();
        let outcome = tree.write(&p("x.y.z.w"), json!(2), true).unwrap();
        assert_eq!(outcome.promoted, Some(p("x.y")));

        // Plain auto-vivification promotes nothing.
        let outcome = tree.write(&p("x.q.r"), json!(3), true).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.promoted, None);
    }

    #[test]
    fn promotion_can_be_disabled() {
        let mut tree = PathTree::new();
        tree.write(&p("a.b"), json!(5), false).unwrap();

        let err = tree.write(&p("a.b.c.d"), json!(6), false).unwrap_err();
        match err {
            StoreError::StructuralConflict { conflict_at, .. } => assert_eq!(conflict_at, "a.b"),
            other => panic!("unexpected error {other:?}"),
        }
        // Nothing was created along the way.
        assert!(!tree.contains(&p("a.b.c")));
    }

    #[test]
    fn group_cannot_be_overwritten_by_scalar() {
        let mut tree = PathTree::new();
        tree.write(&p("a.b"), json!(1), true).unwrap();
        assert!(matches!(
            tree.write(&p("a"), json!(2), true),
            Err(StoreError::StructuralConflict { .. })
        ));
    }

    #[test]
    fn object_write_replaces_subtree() {
        let mut tree = PathTree::new();
        tree.write(&p("theme.light.bg"), json!("#fff"), true).unwrap();
        assert!(tree.write(&p("theme.light"), json!({ "fg": "#000" }), true).unwrap().changed);

        assert!(matches!(tree.read(&p("theme.light.bg")), Lookup::Missing(_)));
        assert_eq!(tree.read(&p("theme.light.fg")), Lookup::Value(json!("#000")));
        assert!(!tree.write(&p("theme.light"), json!({ "fg": "#000" }), true).unwrap().changed);
    }

    #[test]
    fn plain_mapping_mirrors_structure() {
        let mut tree = PathTree::new();
        tree.write(&p("a.b"), json!(1), true).unwrap();
        tree.write(&p("a.c"), Value::Null, true).unwrap();
        tree.ensure_group(&p("empty"), true).unwrap();

        assert_eq!(
            Value::Object(tree.to_plain_mapping()),
            json!({ "a": { "b": 1, "c": null }, "empty": {} })
        );
    }

    #[test]
    fn untagged_serde_round_trip() {
        let node: Node = serde_json::from_value(json!({ "x": { "y": [1, 2] }, "z": null })).unwrap();
        assert_eq!(node.kind(), NodeKind::Group);
        assert_eq!(node.to_value(), json!({ "x": { "y": [1, 2] }, "z": null }));
    }
}
