//! Leaf Cache
//!
//! A flat map from full path to the last resolved leaf value, so a repeated
//! read is a single hash lookup on the raw path string.
//!
//! # Invalidation
//!
//! Next to the flat map sits a prefix index: a trie of path segments where
//! a node exists only if a cached path runs through it. Invalidating `P`
//! walks to `P`'s trie node, detaches it, and removes every cached path
//! found underneath. The cost is the depth of `P` plus the number of
//! entries removed; unrelated entries are never visited.
//!
//! Entries at proper ancestors of `P` are removed as well. A cached leaf at
//! `a` stops being valid when a write to `a.b` promotes it to a group.
//!
//! The cache is derived state. It is only ever filled by reads, and dropping
//! it entirely never changes what a read returns.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::tree::{Lookup, Path, PathTree};

#[derive(Debug, Default)]
struct IndexNode {
    /// Set when the path ending at this node has a cache entry.
    cached: bool,
    children: HashMap<String, IndexNode>,
}

impl IndexNode {
    fn is_vacant(&self) -> bool {
        !self.cached && self.children.is_empty()
    }

    /// Push the full path of every cached entry in this subtree.
    fn collect(&self, prefix: &mut String, out: &mut Vec<String>) {
        if self.cached {
            out.push(prefix.clone());
        }
        for (segment, child) in &self.children {
            let len = prefix.len();
            prefix.push('.');
            prefix.push_str(segment);
            child.collect(prefix, out);
            prefix.truncate(len);
        }
    }

    /// Clear `cached` at the node addressed by `segments`, pruning nodes
    /// that end up vacant. Returns true if an entry was cleared.
    fn unmark<'a>(&mut self, mut segments: impl Iterator<Item = &'a str>) -> bool {
        match segments.next() {
            None => std::mem::replace(&mut self.cached, false),
            Some(segment) => {
                let Some(child) = self.children.get_mut(segment) else {
                    return false;
                };
                let cleared = child.unmark(segments);
                if child.is_vacant() {
                    self.children.remove(segment);
                }
                cleared
            }
        }
    }
}

/// Path-scoped leaf value cache.
#[derive(Debug, Default)]
pub struct LeafCache {
    entries: HashMap<Path, Value>,
    index: IndexNode,
}

impl LeafCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    /// Cached entry for `path` with the interned key, if any.
    pub fn get_entry(&self, path: &str) -> Option<(&Path, &Value)> {
        self.entries.get_key_value(path)
    }

    /// Read `path`, answering from the cache when possible. A tree read that
    /// lands on a leaf is remembered; groups and missing results never are.
    pub fn resolve(&mut self, path: &Path, tree: &PathTree) -> Lookup {
        if let Some(value) = self.entries.get(path) {
            trace!(path = %path, "cache hit");
            return Lookup::Value(value.clone());
        }
        let lookup = tree.read(path);
        if let Lookup::Value(value) = &lookup {
            trace!(path = %path, "cache miss; caching leaf");
            self.insert(path.clone(), value.clone());
        }
        lookup
    }

    /// Record the resolved value of a leaf.
    pub fn insert(&mut self, path: Path, value: Value) {
        let mut node = &mut self.index;
        for segment in path.segments() {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.cached = true;
        self.entries.insert(path, value);
    }

    /// Drop the entry for `path`, every entry below it, and every entry at
    /// one of its ancestors. Returns how many entries were removed.
    pub fn invalidate(&mut self, path: &Path) -> usize {
        let mut removed = 0;

        for ancestor in path.ancestors() {
            if self.index.unmark(ancestor.split('.')) {
                self.entries.remove(ancestor);
                removed += 1;
            }
        }

        // Detach the subtree rooted at `path`.
        let mut parent = &mut self.index;
        let mut segments = path.segments().peekable();
        let mut subtree = None;
        let mut trail = Vec::new();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                subtree = parent.children.remove(segment);
                break;
            }
            match parent.children.get_mut(segment) {
                Some(child) => {
                    trail.push(segment);
                    parent = child;
                }
                None => break,
            }
        }

        if let Some(subtree) = subtree {
            let mut prefix = path.as_str().to_string();
            let mut doomed = Vec::new();
            subtree.collect(&mut prefix, &mut doomed);
            for key in &doomed {
                self.entries.remove(key.as_str());
            }
            removed += doomed.len();
            self.prune(&trail);
        }

        if removed > 0 {
            trace!(path = %path, removed, "invalidated cache entries");
        }
        removed
    }

    /// Remove index nodes along `trail` that no longer lead anywhere.
    fn prune(&mut self, trail: &[&str]) {
        for depth in (1..=trail.len()).rev() {
            let (last, head) = match trail[..depth].split_last() {
                Some(split) => split,
                None => return,
            };
            let mut node = &mut self.index;
            for segment in head {
                match node.children.get_mut(*segment) {
                    Some(child) => node = child,
                    None => return,
                }
            }
            if !node.children.get(*last).is_some_and(IndexNode::is_vacant) {
                return;
            }
            node.children.remove(*last);
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = IndexNode::default();
    }

    /// Number of cached leaves.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }
}
