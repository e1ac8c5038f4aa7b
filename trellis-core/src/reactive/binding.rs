//! Reactive Bindings
//!
//! A [`Reactive`] wraps a computation so that it re-runs whenever a value it
//! read on its previous run changes.
//!
//! # How Bindings Work
//!
//! 1. Calling the binding opens a tracking frame, runs the computation, and
//!    closes the frame. The paths recorded in that frame *replace* the
//!    binding's previous dependency set; nothing accumulates across runs,
//!    so a computation that branches only depends on the branch it took.
//!
//! 2. A binding with a non-empty dependency set listens on the store's
//!    change signal. A binding whose last run read nothing is static and
//!    does not listen at all.
//!
//! 3. When a change matches the dependency set, the computation is re-run
//!    synchronously with the arguments of its most recent call, and its
//!    dependencies are re-recorded. The return value of a re-run is
//!    discarded; an error from it propagates to whoever made the write.
//!
//! # Lifetime
//!
//! The binding lives as long as any clone of its handle. Dropping the last
//! handle unsubscribes it. [`Reactive::dispose`] stops re-runs explicitly;
//! a disposed binding can still be called and behaves like the bare
//! computation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::subscriber::{BindingId, SubscriptionId};
use super::tracker::DependencySet;
use crate::config::DependencyMatch;
use crate::error::Result;
use crate::store::Store;
use crate::tree::Path;

type Computation<A, R> = dyn Fn(A) -> Result<R> + Send + Sync;

struct BindingInner<A, R> {
    id: BindingId,
    store: Store,
    computation: Box<Computation<A, R>>,
    dependencies: RwLock<DependencySet>,
    last_args: Mutex<Option<A>>,
    subscription: Mutex<Option<SubscriptionId>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// A computation re-invoked when the store values it read change.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new();
/// store.set("window.width", 800)?;
///
/// let resize = store.reactive_fn(|| {
///     let width = store.get_as::<u32>("window.width")?;
///     println!("width is {width}");
///     Ok(())
/// });
///
/// resize.run()?;                    // prints "width is 800"
/// store.set("window.width", 1024)?; // prints "width is 1024"
/// ```
pub struct Reactive<A, R> {
    inner: Arc<BindingInner<A, R>>,
}

impl<A, R> Reactive<A, R>
where
    A: Clone + Send + 'static,
    R: 'static,
{
    pub(crate) fn new<F>(store: Store, computation: F) -> Self
    where
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(BindingInner {
                id: BindingId::new(),
                store,
                computation: Box::new(computation),
                dependencies: RwLock::new(DependencySet::new()),
                last_args: Mutex::new(None),
                subscription: Mutex::new(None),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Invoke the computation with tracking.
    pub fn call(&self, args: A) -> Result<R> {
        self.inner.run(args)
    }

    /// Stop re-running. Later calls run the bare computation, untracked.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.detach();
        *self.inner.dependencies.write() = DependencySet::new();
        self.inner.last_args.lock().take();
    }

    /// Check if the binding has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Paths read during the most recent tracked run.
    pub fn dependencies(&self) -> DependencySet {
        self.inner.dependencies.read().clone()
    }

    /// Number of tracked runs, explicit calls and re-runs alike.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// True while the binding listens for changes.
    pub fn is_listening(&self) -> bool {
        let subscription = *self.inner.subscription.lock();
        subscription.is_some_and(|id| self.inner.store.signal().is_subscribed(id))
    }

    /// Get the binding's unique ID.
    pub fn id(&self) -> BindingId {
        self.inner.id
    }
}

impl<R: 'static> Reactive<(), R> {
    /// Invoke a binding that takes no arguments.
    pub fn run(&self) -> Result<R> {
        self.call(())
    }
}

impl<A, R> BindingInner<A, R>
where
    A: Clone + Send + 'static,
    R: 'static,
{
    fn run(self: &Arc<Self>, args: A) -> Result<R> {
        if self.disposed.load(Ordering::SeqCst) {
            return (self.computation)(args);
        }

        *self.last_args.lock() = Some(args.clone());

        let scope = self.store.tracker().scope();
        let result = (self.computation)(args);
        let dependencies = scope.finish();

        let is_static = dependencies.is_empty();
        *self.dependencies.write() = dependencies;
        self.run_count.fetch_add(1, Ordering::SeqCst);

        if is_static {
            self.detach();
        } else {
            self.attach();
        }
        result
    }

    fn attach(self: &Arc<Self>) {
        let mut subscription = self.subscription.lock();
        if let Some(id) = *subscription {
            if self.store.signal().is_subscribed(id) {
                return;
            }
        }

        let weak = Arc::downgrade(self);
        let mode = self.store.config().dependency_match;
        *subscription = Some(self.store.signal().subscribe(move |path, _value| {
            match weak.upgrade() {
                Some(binding) => binding.on_change(path, mode),
                None => Ok(()),
            }
        }));
    }

    fn on_change(self: &Arc<Self>, path: &Path, mode: DependencyMatch) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) || !self.dependencies.read().matches(path, mode) {
            return Ok(());
        }
        let Some(args) = self.last_args.lock().clone() else {
            return Ok(());
        };
        debug!(binding = self.id.raw(), path = %path, "dependency changed; re-running binding");
        self.run(args).map(drop)
    }
}

impl<A, R> BindingInner<A, R> {
    fn detach(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(id) = subscription {
            self.store.signal().unsubscribe(id);
        }
    }
}

impl<A, R> Drop for BindingInner<A, R> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<A, R> Clone for Reactive<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> std::fmt::Debug for Reactive<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("run_count", &self.inner.run_count.load(Ordering::SeqCst))
            .field("dependency_count", &self.inner.dependencies.read().len())
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
