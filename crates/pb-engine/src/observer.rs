//! Listener registry for beat and note notifications.
//!
//! Listeners are removed either explicitly by key or by cancelling their
//! [`Subscription`]. Cancellation only flips a flag, so it is safe from
//! inside any callback, including the one currently being dispatched;
//! flagged entries are skipped immediately and swept after dispatch.

use pb_ir::ListenerKey;
use slotmap::SlotMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Callback<E> = Box<dyn FnMut(&E) + Send>;

struct Entry<E> {
    callback: Callback<E>,
    cancelled: Arc<AtomicBool>,
}

/// Ordered-delivery observer list keyed by [`ListenerKey`].
pub struct ObserverRegistry<E> {
    entries: SlotMap<ListenerKey, Entry<E>>,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self { entries: SlotMap::with_key() }
    }

    /// Register a listener. Dropping the returned handle unsubscribes it.
    pub fn subscribe<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.sweep();
        let cancelled = Arc::new(AtomicBool::new(false));
        let key = self.entries.insert(Entry { callback: Box::new(callback), cancelled: cancelled.clone() });
        Subscription { key, cancelled, armed: true }
    }

    /// Remove a listener immediately. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, key: ListenerKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Deliver `event` to every live listener.
    pub fn notify(&mut self, event: &E) {
        for (_, entry) in self.entries.iter_mut() {
            if !entry.cancelled.load(Ordering::Acquire) {
                (entry.callback)(event);
            }
        }
        self.sweep();
    }

    /// Number of listeners not yet cancelled.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.cancelled.load(Ordering::Acquire)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&mut self) {
        self.entries.retain(|_, e| !e.cancelled.load(Ordering::Acquire));
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    key: ListenerKey,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Subscription {
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// A cloneable handle that can cancel this listener from anywhere,
    /// including from inside a callback.
    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancelled.clone())
    }

    /// Keep the listener registered for the registry's lifetime.
    pub fn detach(mut self) {
        self.armed = false;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::Release);
        }
    }
}

/// Cancels a listener; see [`Subscription::canceller`].
#[derive(Clone)]
pub struct Canceller(Arc<AtomicBool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}
