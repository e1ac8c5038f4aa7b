//! Trellis Core
//!
//! This crate provides a hierarchical settings store addressed by dot paths
//! (`window.width`, `theme.dark.fg`). It implements:
//!
//! - A path-keyed tree with auto-vivification and safe missing reads
//! - A leaf cache with prefix-scoped invalidation
//! - Change-only notification: equal writes are silent
//! - Reactive bindings that re-run when the values they read change
//! - A theme overlay exposing parallel mode groups under a short alias
//! - Snapshots as plain mappings, JSON, or MessagePack
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `tree`: Paths, nodes, the tree itself, and read results
//! - `cache`: Leaf cache and its prefix index
//! - `reactive`: Change signal, dependency tracking, and bindings
//! - `theme`: Alias resolution and the write guard
//! - `snapshot`: Export and merge
//! - `store`: The facade tying everything together
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::Store;
//!
//! let store = Store::new();
//! store.set("theme.light.bg", "#ffffff")?;
//! store.set("theme.dark.bg", "#1e1e2e")?;
//!
//! // Re-runs whenever the active background changes.
//! let reader = store.clone();
//! let refresh = store.reactive_fn(move || {
//!     println!("background: {}", reader.get("theme.bg")?.try_to_string()?);
//!     Ok(())
//! });
//!
//! refresh.run()?;                   // prints "background: #ffffff"
//! store.set("theme.mode", "dark")?; // prints "background: #1e1e2e"
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod error;
pub mod reactive;
pub mod snapshot;
pub mod store;
pub mod theme;
pub mod tree;

pub use accessor::Accessor;
pub use cache::LeafCache;
pub use config::{DependencyMatch, StoreConfig, ThemeConfig};
pub use error::{Result, StoreError};
pub use reactive::{
    BindingId, ChangeSignal, DependencySet, DependencyTracker, Reactive, SubscriptionId,
    TrackingScope,
};
pub use store::Store;
pub use theme::ThemeResolver;
pub use tree::{GroupView, Lookup, Missing, Node, NodeKind, Path, PathTree, WriteOutcome};

pub use serde_json::Value;
