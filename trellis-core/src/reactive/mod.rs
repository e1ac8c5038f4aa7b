//! Reactive Layer
//!
//! Change notification and automatic re-runs on top of the settings tree.
//!
//! # Concepts
//!
//! ## Change Signal
//!
//! Every write that actually changes a value is broadcast as
//! `(path, new_value)` to the store's listeners, synchronously and in
//! subscription order. Writes that store an equal value are silent.
//!
//! ## Dependency Tracking
//!
//! While a tracked computation runs, every read it performs is recorded in
//! a frame on the tracker's stack. Frames nest: an outer computation that
//! calls an inner one records the inner one's reads too.
//!
//! ## Bindings
//!
//! A binding is a computation plus the set of paths its last run read. It
//! listens on the change signal and re-runs when one of those paths
//! changes, re-recording its dependencies each time.
//!
//! # Implementation Notes
//!
//! Tracking is explicit about ownership: the tracker belongs to a store and
//! keys its frames by thread, so neither stores nor threads share frames.
//! This is the same automatic dependency tracking used by fine-grained UI
//! frameworks, with dot paths in place of individual signals.

mod binding;
mod signal;
mod subscriber;
mod tracker;

pub use binding::Reactive;
pub use signal::{ChangeSignal, Listener};
pub use subscriber::{BindingId, SubscriptionId};
pub use tracker::{DependencySet, DependencyTracker, FrameToken, SuspendGuard, TrackingScope};
