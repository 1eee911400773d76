//! Process-wide proofreading on/off switch.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    enabled: bool,
    next_id: u64,
    subscribers: BTreeMap<u64, Callback>,
}

/// Observable boolean shared by every session.
///
/// Subscribers are called after each change, outside the lock, in
/// subscription order. Setting the current value again notifies no one.
pub struct EnablementStore {
    inner: Mutex<Inner>,
}

impl EnablementStore {
    pub fn new(enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                enabled,
                next_id: 0,
                subscribers: BTreeMap::new(),
            }),
        })
    }

    pub fn get(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Returns whether the value changed.
    pub fn set(&self, enabled: bool) -> bool {
        self.update(|_| enabled).1
    }

    /// Flip the value and return the new one.
    pub fn toggle(&self) -> bool {
        self.update(|enabled| !enabled).0
    }

    fn update(&self, next: impl FnOnce(bool) -> bool) -> (bool, bool) {
        let (enabled, callbacks): (bool, Vec<Callback>) = {
            let mut inner = self.inner.lock();
            let enabled = next(inner.enabled);
            if inner.enabled == enabled {
                return (enabled, false);
            }
            inner.enabled = enabled;
            (enabled, inner.subscribers.values().cloned().collect())
        };
        debug!(enabled, subscribers = callbacks.len(), "proofreading toggled");
        for callback in callbacks {
            callback(enabled);
        }
        (enabled, true)
    }

    /// Register `callback`. It is not called with the current value.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Arc::new(callback));
        Subscription {
            store: Arc::downgrade(self),
            id: Some(id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl std::fmt::Debug for EnablementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EnablementStore")
            .field("enabled", &inner.enabled)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

/// Keeps a subscription alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    store: Weak<EnablementStore>,
    id: Option<u64>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(store)) = (self.id.take(), self.store.upgrade()) {
            store.inner.lock().subscribers.remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
