//! Dependency Tracker
//!
//! Records which paths a running computation reads.
//!
//! # Implementation
//!
//! The tracker keeps one stack of frames per thread. Entering a tracked
//! computation pushes an empty [`DependencySet`]; every read reported while
//! the stack is non-empty is added to *every* frame on it, so an outer
//! computation that calls an inner one depends on the inner one's reads as
//! well. Leaving the computation pops its frame and hands the set back.
//!
//! The stacks belong to the tracker, and the tracker belongs to a store.
//! Two stores never see each other's frames, and two threads using one
//! store never see each other's frames either.
//!
//! `clear` bumps a generation counter. Frames opened before a clear are
//! treated as gone: popping one returns an empty set instead of stealing a
//! frame opened after the clear.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use indexmap::IndexSet;
use tracing::warn;

use crate::config::DependencyMatch;
use crate::tree::Path;

/// Paths read during one execution of a tracked computation.
///
/// Besides ordinary reads, a set can hold *presence* paths: nodes whose
/// existence the computation checked without using their value. Those are
/// only affected by a write that replaces one of their ancestors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    paths: IndexSet<Path>,
    presence: IndexSet<Path>,
}

impl DependencySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path. Returns false if it was already present.
    pub fn insert(&mut self, path: Path) -> bool {
        self.paths.insert(path)
    }

    /// Add a path whose existence, not value, was observed.
    pub fn insert_presence(&mut self, path: Path) -> bool {
        self.presence.insert(path)
    }

    /// True when `path` was read.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// True when only the existence of `path` was observed.
    pub fn watches_presence(&self, path: &str) -> bool {
        self.presence.contains(path)
    }

    /// Number of distinct paths read.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when nothing was read or checked.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.presence.is_empty()
    }

    /// Paths in first-read order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    /// Whether a change at `changed` is relevant to a computation that read
    /// this set.
    pub fn matches(&self, changed: &Path, mode: DependencyMatch) -> bool {
        if self.paths.contains(changed) {
            return true;
        }
        if mode == DependencyMatch::Prefix
            && changed.ancestors().any(|ancestor| self.paths.contains(ancestor))
        {
            return true;
        }
        // A write that replaced a whole subtree changed everything under it.
        self.paths
            .iter()
            .chain(&self.presence)
            .any(|read| changed.is_proper_prefix_of(read))
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a Path;
    type IntoIter = indexmap::set::Iter<'a, Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

impl FromIterator<Path> for DependencySet {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
            presence: IndexSet::new(),
        }
    }
}

/// Proof of a `push_frame`, consumed by the matching `pop_frame`.
#[derive(Debug)]
#[must_use = "a pushed frame must be popped"]
pub struct FrameToken {
    depth: usize,
    generation: u64,
}

/// Per-store, per-thread read recorder.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    stacks: DashMap<ThreadId, Vec<DependencySet>>,
    generation: AtomicU64,
}

impl DependencyTracker {
    /// Create a tracker with no active frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a recording scope on the current thread.
    pub fn push_frame(&self) -> FrameToken {
        let mut stack = self.stacks.entry(thread::current().id()).or_default();
        stack.push(DependencySet::new());
        FrameToken {
            depth: stack.len(),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Add `path` to every frame open on the current thread.
    pub fn record_read(&self, path: &Path) {
        if let Some(mut stack) = self.stacks.get_mut(&thread::current().id()) {
            for frame in stack.iter_mut() {
                frame.insert(path.clone());
            }
        }
    }

    /// Add `path` as a presence check to every frame open on the current
    /// thread.
    pub fn record_presence(&self, path: &Path) {
        if let Some(mut stack) = self.stacks.get_mut(&thread::current().id()) {
            for frame in stack.iter_mut() {
                frame.insert_presence(path.clone());
            }
        }
    }

    /// End the scope opened by `token` and return what it recorded.
    pub fn pop_frame(&self, token: FrameToken) -> DependencySet {
        if token.generation != self.generation.load(Ordering::Acquire) {
            return DependencySet::new();
        }

        let id = thread::current().id();
        let (frame, now_empty) = {
            let Some(mut stack) = self.stacks.get_mut(&id) else {
                warn!(depth = token.depth, "popping a frame from an empty tracking stack");
                return DependencySet::new();
            };
            if stack.len() != token.depth {
                warn!(
                    expected = token.depth,
                    actual = stack.len(),
                    "tracking stack mismatch; discarding frames above the popped one"
                );
            }
            if stack.len() < token.depth {
                return DependencySet::new();
            }
            stack.truncate(token.depth);
            let frame = stack.pop().unwrap_or_default();
            (frame, stack.is_empty())
        };

        if now_empty {
            self.stacks.remove_if(&id, |_, stack| stack.is_empty());
        }
        frame
    }

    /// Open a frame that is popped when the returned guard is finished or
    /// dropped, so a panicking computation cannot leave a stale frame.
    pub fn scope(&self) -> TrackingScope<'_> {
        TrackingScope {
            tracker: self,
            token: Some(self.push_frame()),
        }
    }

    /// Detach the current thread's frames until the guard drops.
    ///
    /// Reads made while suspended are recorded nowhere (or only in frames
    /// opened during the suspension).
    pub fn suspend(&self) -> SuspendGuard<'_> {
        let saved = self
            .stacks
            .remove(&thread::current().id())
            .map(|(_, stack)| stack);
        SuspendGuard {
            tracker: self,
            saved,
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// True when the current thread has an open frame.
    pub fn is_tracking(&self) -> bool {
        self.depth() > 0
    }

    /// Number of frames open on the current thread.
    pub fn depth(&self) -> usize {
        self.stacks
            .get(&thread::current().id())
            .map(|stack| stack.len())
            .unwrap_or(0)
    }

    /// Drop every frame on every thread.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.stacks.clear();
    }
}

/// RAII frame on a [`DependencyTracker`].
#[derive(Debug)]
pub struct TrackingScope<'a> {
    tracker: &'a DependencyTracker,
    token: Option<FrameToken>,
}

impl TrackingScope<'_> {
    /// Close the frame and return the recorded paths.
    pub fn finish(mut self) -> DependencySet {
        match self.token.take() {
            Some(token) => self.tracker.pop_frame(token),
            None => DependencySet::new(),
        }
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.tracker.pop_frame(token);
        }
    }
}

/// Restores a thread's frames detached by [`DependencyTracker::suspend`].
#[derive(Debug)]
pub struct SuspendGuard<'a> {
    tracker: &'a DependencyTracker,
    saved: Option<Vec<DependencySet>>,
    generation: u64,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        let Some(mut restored) = self.saved.take() else {
            return;
        };
        if self.generation != self.tracker.generation.load(Ordering::Acquire) {
            return;
        }
        let mut stack = self
            .tracker
            .stacks
            .entry(thread::current().id())
            .or_default();
        // Frames opened during the suspension stay on top.
        restored.append(&mut *stack);
        *stack = restored;
    }
}
