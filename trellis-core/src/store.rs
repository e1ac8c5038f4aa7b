//! Store
//!
//! The public face of the crate. A [`Store`] owns one settings tree and
//! everything derived from it:
//!
//! - the [`LeafCache`] answering repeated reads,
//! - the [`DependencyTracker`] recording reads for reactive bindings,
//! - the [`ChangeSignal`] broadcasting effective writes,
//! - the optional [`ThemeResolver`] overlay.
//!
//! # Read path
//!
//! `get` first checks whether the path is a theme alias. Otherwise the raw
//! string is looked up in the cache; a hit costs one hash lookup and never
//! parses the path. On a miss the path is parsed, the tree is walked under
//! its read lock, and a leaf result is cached before the lock is released.
//! Either way the read is recorded with the tracker.
//!
//! # Write path
//!
//! `set` writes under the tree's write lock and, if the value changed,
//! invalidates the cache before releasing it. The notification is sent
//! after the lock is gone, so listeners are free to read and write. While
//! listeners run, the writing thread's tracking frames are suspended.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::LeafCache;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::reactive::{ChangeSignal, DependencyTracker, Reactive, SubscriptionId};
use crate::theme::ThemeResolver;
use crate::tree::{Lookup, Node, Path, PathTree};

struct StoreInner {
    config: StoreConfig,
    theme: Option<ThemeResolver>,
    tree: RwLock<PathTree>,
    cache: RwLock<LeafCache>,
    tracker: DependencyTracker,
    signal: ChangeSignal,
}

/// Hierarchical settings store.
///
/// Cloning is cheap and every clone refers to the same store.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new();
/// store.set("window.width", 800)?;
///
/// assert_eq!(store.get("window.width")?, json!(800));
/// assert!(store.get("window.depth")?.is_none());
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store with the default configuration (theme overlay on).
    pub fn new() -> Self {
        let config = StoreConfig::default();
        let theme = config.theme.is_some().then(ThemeResolver::default);
        Self::from_parts(config, theme)
    }

    /// Create a store with an explicit configuration.
    ///
    /// Fails with `InvalidThemeConfig` when the theme layout is unusable.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let theme = config.theme.clone().map(ThemeResolver::new).transpose()?;
        Ok(Self::from_parts(config, theme))
    }

    fn from_parts(config: StoreConfig, theme: Option<ThemeResolver>) -> Self {
        let store = Self {
            inner: Arc::new(StoreInner {
                config,
                theme,
                tree: RwLock::new(PathTree::new()),
                cache: RwLock::new(LeafCache::new()),
                tracker: DependencyTracker::new(),
                signal: ChangeSignal::new(),
            }),
        };
        store.seed(&mut store.inner.tree.write());
        store
    }

    fn seed(&self, tree: &mut PathTree) {
        if let Some(theme) = &self.inner.theme {
            theme.seed(tree);
        }
    }

    /// Configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The theme overlay, when enabled.
    pub fn theme(&self) -> Option<&ThemeResolver> {
        self.inner.theme.as_ref()
    }

    /// The store's dependency tracker.
    pub fn tracker(&self) -> &DependencyTracker {
        &self.inner.tracker
    }

    pub(crate) fn signal(&self) -> &ChangeSignal {
        &self.inner.signal
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read `path`. Absent keys yield [`Lookup::Missing`], not an error.
    pub fn get(&self, path: &str) -> Result<Lookup> {
        if let Some(theme) = &self.inner.theme {
            if let Some(key) = theme.alias_key(path) {
                Path::parse(path)?;
                return theme.read(self, key);
            }
        }

        let hit = self
            .inner
            .cache
            .read()
            .get_entry(path)
            .map(|(key, value)| (key.clone(), value.clone()));
        if let Some((key, value)) = hit {
            trace!(path, "cache hit");
            self.inner.tracker.record_read(&key);
            return Ok(Lookup::Value(value));
        }

        Ok(self.read_tracked(&Path::parse(path)?))
    }

    /// Read a leaf value; missing keys and groups are errors.
    pub fn get_value(&self, path: &str) -> Result<Value> {
        self.get(path)?.into_value()
    }

    /// Read a leaf and decode it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path)?.deserialize()
    }

    /// True when `path` resolves to a node of either kind. Not tracked.
    pub fn contains(&self, path: &str) -> Result<bool> {
        let parsed = Path::parse(path)?;
        let tree = self.inner.tree.read();
        if let Some(theme) = &self.inner.theme {
            if let Some(key) = theme.alias_key(path) {
                let mode = theme.mode_from(&tree.read(theme.selector_path()))?;
                return Ok(tree.contains(&theme.qualify(mode, key)?));
            }
        }
        Ok(tree.contains(&parsed))
    }

    /// Record and resolve a parsed path through the cache.
    pub(crate) fn read_tracked(&self, path: &Path) -> Lookup {
        self.inner.tracker.record_read(path);
        let tree = self.inner.tree.read();
        self.inner.cache.write().resolve(path, &tree)
    }

    pub(crate) fn contains_path(&self, path: &Path) -> bool {
        self.inner.tree.read().contains(path)
    }

    /// Run `f` against the tree under its read lock. Not tracked.
    pub(crate) fn with_tree<T>(&self, f: impl FnOnce(&PathTree) -> T) -> T {
        f(&self.inner.tree.read())
    }

    /// Number of leaves currently cached.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.read().len()
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write `value` at `path`.
    ///
    /// Listeners are notified only if the stored value actually changed.
    /// When the write turns a leaf ancestor into a group, a second
    /// notification follows for that ancestor with its new contents.
    /// A listener error is returned here, after the write has been applied.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.set_path(&Path::parse(path)?, value)
    }

    /// Write to an already parsed path, e.g. the path of a missing result.
    pub fn set_path(&self, path: &Path, value: impl Into<Value>) -> Result<()> {
        if let Some(theme) = &self.inner.theme {
            theme.check_write(path.as_str())?;
        }

        let value = value.into();
        let (outcome, promoted_value) = {
            let mut tree = self.inner.tree.write();
            let outcome = tree.write(path, value.clone(), self.inner.config.promote_leaves)?;
            if outcome.changed {
                self.inner.cache.write().invalidate(path);
            }
            let promoted_value = outcome
                .promoted
                .as_ref()
                .and_then(|ancestor| tree.node(ancestor))
                .map(Node::to_value);
            (outcome, promoted_value)
        };

        if !outcome.changed {
            trace!(path = %path, "value unchanged; nothing to notify");
            return Ok(());
        }

        let _suspended = self.inner.tracker.suspend();
        self.inner.signal.emit(path.clone(), value)?;
        if let (Some(ancestor), Some(contents)) = (outcome.promoted, promoted_value) {
            self.inner.signal.emit(ancestor, contents)?;
        }
        Ok(())
    }

    /// Make sure a group exists at `path`. Creates silently; an existing
    /// node of either kind is left alone.
    pub(crate) fn ensure_group(&self, path: &Path) -> Result<()> {
        let mut tree = self.inner.tree.write();
        if tree.contains(path) {
            return Ok(());
        }
        if tree.ensure_group(path, self.inner.config.promote_leaves)? {
            self.inner.cache.write().invalidate(path);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listeners and bindings
    // ------------------------------------------------------------------------

    /// Register a listener for every effective write.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Path, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.signal.subscribe(listener)
    }

    /// Remove a listener. Unsubscribing twice is harmless.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.signal.unsubscribe(id)
    }

    /// Wrap a computation so it re-runs when the values it reads change.
    pub fn reactive<A, R, F>(&self, computation: F) -> Reactive<A, R>
    where
        A: Clone + Send + 'static,
        R: 'static,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        Reactive::new(self.clone(), computation)
    }

    /// [`reactive`](Store::reactive) for computations without arguments.
    pub fn reactive_fn<R, F>(&self, computation: F) -> Reactive<(), R>
    where
        R: 'static,
        F: Fn() -> Result<R> + Send + Sync + 'static,
    {
        self.reactive(move |()| computation())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Drop all data, listeners, cache entries and tracking frames, then
    /// re-seed the theme overlay.
    ///
    /// Bindings created before the reset stop listening; calling one again
    /// re-subscribes it.
    pub fn reset(&self) {
        self.inner.signal.clear();
        self.inner.tracker.clear();

        let mut tree = self.inner.tree.write();
        tree.clear();
        self.inner.cache.write().clear();
        self.seed(&mut tree);
        debug!("store reset");
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("cached_leaves", &self.cache_len())
            .field("listeners", &self.inner.signal.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn recorder(store: &Store) -> Arc<Mutex<Vec<(String, Value)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        store.subscribe(move |path, value| {
            sink.lock().push((path.to_string(), value.clone()));
            Ok(())
        });
        log
    }

    #[test]
    fn set_then_get() {
        let store = Store::new();
        store.set("window.width", 800).unwrap();
        assert_eq!(store.get("window.width").unwrap(), json!(800));
        assert_eq!(store.get_as::<u32>("window.width").unwrap(), 800);
        assert!(store.get("window").unwrap().is_group());
    }

    #[test]
    fn missing_reads_are_safe() {
        let store = Store::new();
        let lookup = store.get("nope.deeper").unwrap();
        assert!(lookup.is_none());
        assert!(store.get_value("nope.deeper").unwrap_err().is_missing_access());

        // The marker's path is a valid write target.
        let target = lookup.as_missing().unwrap().path().clone();
        store.set_path(&target, true).unwrap();
        assert_eq!(store.get("nope.deeper").unwrap(), json!(true));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let store = Store::new();
        assert!(matches!(store.get(""), Err(StoreError::InvalidPath { .. })));
        assert!(matches!(store.set("a..b", 1), Err(StoreError::InvalidPath { .. })));
        assert!(matches!(store.get("theme.fg."), Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn listeners_fire_only_on_change() {
        let store = Store::new();
        let log = recorder(&store);

        store.set("w", 1).unwrap();
        store.set("w", 1).unwrap();
        store.set("w", 2).unwrap();

        assert_eq!(
            *log.lock(),
            vec![("w".to_string(), json!(1)), ("w".to_string(), json!(2))]
        );
    }

    #[test]
    fn reads_populate_and_writes_invalidate_the_cache() {
        let store = Store::with_config(StoreConfig::without_theme()).unwrap();
        store.set("a.b", 1).unwrap();
        assert_eq!(store.cache_len(), 0);

        store.get("a.b").unwrap();
        assert_eq!(store.cache_len(), 1);
        store.get("a").unwrap();
        store.get("zzz").unwrap();
        assert_eq!(store.cache_len(), 1);

        store.set("a.b", 1).unwrap();
        assert_eq!(store.cache_len(), 1);
        store.set("a.b", 2).unwrap();
        assert_eq!(store.cache_len(), 0);
        assert_eq!(store.get("a.b").unwrap(), json!(2));
    }

    #[test]
    fn promotion_invalidates_cached_ancestor() {
        let store = Store::new();
        store.set("a", 5).unwrap();
        assert_eq!(store.get("a").unwrap(), json!(5));

        store.set("a.b", 6).unwrap();
        assert!(store.get("a").unwrap().is_group());
        assert_eq!(store.get("a.b").unwrap(), json!(6));
    }

    #[test]
    fn listener_error_surfaces_after_the_write() {
        let store = Store::new();
        store.subscribe(|_, _| Err(StoreError::listener("rejected")));

        assert!(matches!(store.set("k", 1), Err(StoreError::Listener(_))));
        assert_eq!(store.get("k").unwrap(), json!(1));
    }

    #[test]
    fn theme_alias_follows_the_mode() {
        let store = Store::new();
        store.set("theme.light.fg", "#111").unwrap();
        store.set("theme.dark.fg", "#eee").unwrap();

        assert_eq!(store.get("theme.fg").unwrap(), json!("#111"));
        store.set("theme.mode", "dark").unwrap();
        assert_eq!(store.get("theme.fg").unwrap(), json!("#eee"));
        assert!(store.contains("theme.fg").unwrap());
        assert!(!store.contains("theme.bg").unwrap());
    }

    #[test]
    fn theme_asymmetry_is_an_error() {
        let store = Store::new();
        store.set("theme.light.accent", "#06c").unwrap();

        match store.get("theme.accent") {
            Err(StoreError::ThemeKeyAsymmetry { key, missing_in }) => {
                assert_eq!(key, "accent");
                assert_eq!(missing_in, "theme.dark.accent");
            }
            other => panic!("expected asymmetry error, got {other:?}"),
        }

        // Absent everywhere is just missing.
        assert!(store.get("theme.nothing").unwrap().is_missing());
    }

    #[test]
    fn theme_alias_writes_are_rejected() {
        let store = Store::new();
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(
            store.set("theme.fg", "#000"),
            Err(StoreError::AmbiguousThemeWrite { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!store.contains("theme.light.fg").unwrap());
    }

    #[test]
    fn unknown_theme_mode() {
        let store = Store::new();
        store.set("theme.mode", "sepia").unwrap();
        assert!(matches!(
            store.get("theme.fg"),
            Err(StoreError::UnknownThemeMode { .. })
        ));
    }

    #[test]
    fn null_selector_uses_default_mode() {
        let store = Store::new();
        store.set("theme.light.bg", "#fff").unwrap();
        store.set("theme.dark.bg", "#000").unwrap();
        store.set("theme.mode", Value::Null).unwrap();
        assert_eq!(store.get("theme.bg").unwrap(), json!("#fff"));
    }

    #[test]
    fn without_theme_the_namespace_is_plain() {
        let store = Store::with_config(StoreConfig::without_theme()).unwrap();
        assert!(store.get("theme").unwrap().is_missing());
        store.set("theme.fg", "#000").unwrap();
        assert_eq!(store.get("theme.fg").unwrap(), json!("#000"));
    }

    #[test]
    fn structural_conflicts() {
        let store = Store::new();
        store.set("a.b", 1).unwrap();
        assert!(matches!(
            store.set("a", 2),
            Err(StoreError::StructuralConflict { .. })
        ));

        let strict = Store::with_config(StoreConfig {
            promote_leaves: false,
            ..StoreConfig::default()
        })
        .unwrap();
        strict.set("a", 1).unwrap();
        assert!(matches!(
            strict.set("a.b", 2),
            Err(StoreError::StructuralConflict { .. })
        ));
    }

    #[test]
    fn reset_restores_fresh_state() {
        let store = Store::new();
        let log = recorder(&store);
        store.set("a.b", 1).unwrap();
        store.get("a.b").unwrap();

        store.reset();
        assert!(store.get("a.b").unwrap().is_missing());
        assert_eq!(store.get("theme.mode").unwrap(), json!("light"));
        assert!(store.get("theme.dark").unwrap().is_group());

        store.set("a.b", 2).unwrap();
        assert_eq!(log.lock().len(), 1);
        assert!(!store.tracker().is_tracking());
    }

    #[test]
    fn reset_drops_listeners_that_own_bindings() {
        let store = Store::new();
        store.set("a", 1).unwrap();
        let reader = store.clone();
        let binding = store.reactive_fn(move || reader.get("a").map(drop));
        binding.run().unwrap();
        store.subscribe(move |_, _| {
            let _ = &binding;
            Ok(())
        });
        assert_eq!(store.signal().listener_count(), 2);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = store.clone();
        std::thread::spawn(move || {
            worker.reset();
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "reset deadlocked"
        );
        assert_eq!(store.signal().listener_count(), 0);
    }

    #[test]
    fn promotion_notifies_for_the_replaced_leaf() {
        let store = Store::with_config(StoreConfig::without_theme()).unwrap();
        store.set("x", 5).unwrap();
        let log = recorder(&store);

        store.set("x.y", 6).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                ("x.y".to_string(), json!(6)),
                ("x".to_string(), json!({ "y": 6 })),
            ]
        );

        // Deeper writes under the new group promote nothing.
        store.set("x.z", 7).unwrap();
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn binding_on_a_promoted_leaf_reruns() {
        let store = Store::with_config(StoreConfig::without_theme()).unwrap();
        store.set("x", 5).unwrap();

        let reader = store.clone();
        let binding = store.reactive_fn(move || Ok(reader.get("x")?.is_group()));
        assert!(!binding.run().unwrap());

        store.set("x.y", 6).unwrap();
        assert_eq!(binding.run_count(), 2);
        assert!(binding.dependencies().contains("x"));
    }

    #[test]
    fn replacing_the_inactive_mode_reruns_theme_bindings() {
        let store = Store::new();
        store.set("theme.light.fg", "#111").unwrap();
        store.set("theme.dark.fg", "#eee").unwrap();

        let reader = store.clone();
        let binding = store.reactive_fn(move || reader.get("theme.fg")?.try_to_string());
        assert_eq!(binding.run().unwrap(), "#111");
        assert!(binding.dependencies().watches_presence("theme.dark.fg"));

        // An edit of the inactive value is not a presence change.
        store.set("theme.dark.fg", "#ddd").unwrap();
        assert_eq!(binding.run_count(), 1);

        // Dropping the key from the inactive mode is.
        let err = store.set("theme.dark", json!({ "bg": "#000" })).unwrap_err();
        assert!(matches!(err, StoreError::ThemeKeyAsymmetry { .. }));
        assert_eq!(binding.run_count(), 2);
    }

    #[test]
    fn writers_on_other_threads_get_their_own_listener_errors() {
        let store = Store::new();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        store.subscribe(move |path, _| {
            if path == "slow" {
                let _ = started_tx.lock().send(());
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Ok(())
        });
        store.subscribe(|path, _| {
            if path == "bad" {
                return Err(StoreError::listener("rejected bad"));
            }
            Ok(())
        });

        let slow = {
            let store = store.clone();
            std::thread::spawn(move || store.set("slow", 1))
        };
        started_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        let bad = {
            let store = store.clone();
            std::thread::spawn(move || store.set("bad", 1))
        };

        assert!(slow.join().unwrap().is_ok());
        assert!(matches!(bad.join().unwrap(), Err(StoreError::Listener(_))));
        assert_eq!(store.get("bad").unwrap(), json!(1));
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new();
        let other = store.clone();
        other.set("shared", "yes").unwrap();
        assert_eq!(store.get("shared").unwrap(), json!("yes"));
    }
}
