//! Change Signal
//!
//! A synchronous, in-process broadcast of `(path, new_value)`.
//!
//! # How Emission Works
//!
//! 1. The store calls [`ChangeSignal::emit`] only after a write that actually
//!    changed a value.
//!
//! 2. Every listener subscribed at delivery time is called in subscription
//!    order. A listener unsubscribed mid-delivery is skipped.
//!
//! 3. The first listener error stops the delivery and is returned to the
//!    writer. Listeners are not isolated from each other.
//!
//! # Re-entrant Emission
//!
//! A listener that writes to the store triggers another `emit` while the
//! first is still delivering. That notification is queued and delivered,
//! in FIFO order, once the current one has reached every listener. Nested
//! emission therefore never recurses, and every listener observes changes
//! in the order the writes happened. If a delivery fails, whatever is still
//! queued is dropped (and logged) and the error goes to the outermost
//! writer.
//!
//! Only the delivering thread can queue. Writers on other threads wait for
//! the delivery in progress to finish and then deliver their own change,
//! so each writer sees the errors of its own notification and nobody
//! else's.
//!
//! # Dropping Listeners
//!
//! A listener closure may own the last handle of something that
//! unsubscribes on drop. Removed closures are therefore dropped only after
//! the listener table is unlocked.
//!
//! # Complexity
//!
//! Subscribing appends to an ordered map. Unsubscribing flips a flag on the
//! slot and leaves a tombstone; tombstones are compacted once they
//! outnumber live listeners, so both operations are amortized O(1).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::subscriber::SubscriptionId;
use crate::error::Result;
use crate::tree::Path;

/// Callback invoked with every change.
pub type Listener = dyn Fn(&Path, &Value) -> Result<()> + Send + Sync;

struct ListenerSlot {
    active: AtomicBool,
    callback: Box<Listener>,
}

#[derive(Default)]
struct Listeners {
    slots: IndexMap<SubscriptionId, Arc<ListenerSlot>>,
    tombstones: usize,
}

impl Listeners {
    fn live(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    /// Remove tombstones and hand them back to be dropped by the caller.
    fn compact(&mut self) -> Vec<Arc<ListenerSlot>> {
        let mut dead = Vec::with_capacity(self.tombstones);
        self.slots.retain(|_, slot| {
            let live = slot.active.load(Ordering::Acquire);
            if !live {
                dead.push(Arc::clone(slot));
            }
            live
        });
        self.tombstones = 0;
        dead
    }
}

#[derive(Default)]
struct Delivery {
    delivering: bool,
    pending: VecDeque<(Path, Value)>,
}

/// Broadcast channel for value changes.
#[derive(Default)]
pub struct ChangeSignal {
    listeners: RwLock<Listeners>,
    delivery: ReentrantMutex<RefCell<Delivery>>,
}

impl ChangeSignal {
    /// Create a signal with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It receives every change emitted from now on.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Path, &Value) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let slot = Arc::new(ListenerSlot {
            active: AtomicBool::new(true),
            callback: Box::new(listener),
        });
        self.listeners.write().slots.insert(id, slot);
        id
    }

    /// Remove a listener. Returns false if it was not subscribed (already
    /// removed, or cleared by a reset).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut compacted = Vec::new();
        let removed = {
            let mut listeners = self.listeners.write();
            let removed = match listeners.slots.get(&id) {
                Some(slot) => slot.active.swap(false, Ordering::AcqRel),
                None => false,
            };
            if removed {
                listeners.tombstones += 1;
                if listeners.tombstones > listeners.live() {
                    compacted = listeners.compact();
                }
            }
            removed
        };
        drop(compacted);
        removed
    }

    /// True while `id` will receive changes.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.listeners
            .read()
            .slots
            .get(&id)
            .is_some_and(|slot| slot.active.load(Ordering::Acquire))
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().live()
    }

    /// Broadcast a change to every listener.
    ///
    /// Blocks while another thread is delivering.
    pub fn emit(&self, path: Path, value: Value) -> Result<()> {
        let lock = self.delivery.lock();
        {
            let mut delivery = lock.borrow_mut();
            delivery.pending.push_back((path, value));
            if delivery.delivering {
                trace!(queued = delivery.pending.len(), "deferring nested change notification");
                return Ok(());
            }
            delivery.delivering = true;
        }

        let mut guard = DeliveryGuard {
            delivery: &*lock,
            armed: true,
        };
        loop {
            let next = lock.borrow_mut().pending.pop_front();
            let Some((path, value)) = next else {
                lock.borrow_mut().delivering = false;
                guard.armed = false;
                return Ok(());
            };
            self.deliver(&path, &value)?;
        }
    }

    fn deliver(&self, path: &Path, value: &Value) -> Result<()> {
        let snapshot: SmallVec<[Arc<ListenerSlot>; 8]> = self
            .listeners
            .read()
            .slots
            .values()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .cloned()
            .collect();

        trace!(path = %path, listeners = snapshot.len(), "delivering change");
        for slot in snapshot {
            if slot.active.load(Ordering::Acquire) {
                (slot.callback)(path, value)?;
            }
        }
        Ok(())
    }

    /// Drop every listener and anything queued for delivery.
    pub fn clear(&self) {
        let removed = {
            let mut listeners = self.listeners.write();
            listeners.tombstones = 0;
            std::mem::take(&mut listeners.slots)
        };
        for slot in removed.values() {
            slot.active.store(false, Ordering::Release);
        }
        drop(removed);
        self.delivery.lock().borrow_mut().pending.clear();
    }
}

impl std::fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

/// Resets delivery state when an emission ends early (listener error or
/// panic).
struct DeliveryGuard<'a> {
    delivery: &'a RefCell<Delivery>,
    armed: bool,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut delivery = self.delivery.borrow_mut();
        delivery.delivering = false;
        if !delivery.pending.is_empty() {
            warn!(
                dropped = delivery.pending.len(),
                "delivery aborted; discarding queued change notifications"
            );
            delivery.pending.clear();
        }
    }
}
