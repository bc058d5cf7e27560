//! Subscription management for change notifications.
//!
//! A [`SubscriptionManager`] owns the callbacks registered against one
//! notification source (a table or a view) and delivers each event to them
//! in subscription order.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type Callback<E> = Box<dyn Fn(&E)>;

/// A registered callback.
pub struct Subscription<E> {
    id: SubscriptionId,
    callback: Callback<E>,
    active: bool,
}

impl<E> Subscription<E> {
    /// Creates a new subscription.
    pub fn new<F>(id: SubscriptionId, callback: F) -> Self
    where
        F: Fn(&E) + 'static,
    {
        Self {
            id,
            callback: Box::new(callback),
            active: true,
        }
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stops delivery without unregistering.
    #[inline]
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    #[inline]
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Delivers `event` if the subscription is active.
    pub fn notify(&self, event: &E) {
        if self.active {
            (self.callback)(event);
        }
    }
}

/// Manages the subscriptions of one notification source.
pub struct SubscriptionManager<E> {
    subscriptions: BTreeMap<SubscriptionId, Subscription<E>>,
    next_id: SubscriptionId,
}

impl<E> Default for SubscriptionManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for SubscriptionManager<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscriptions.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<E> SubscriptionManager<E> {
    /// Creates a new subscription manager. Ids start at 1.
    pub fn new() -> Self {
        Self {
            subscriptions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Registers `callback` and returns the id used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription::new(id, callback));
        id
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Pauses or resumes a single subscription.
    pub fn set_active(&mut self, id: SubscriptionId, active: bool) -> bool {
        match self.subscriptions.get_mut(&id) {
            Some(sub) if active => {
                sub.activate();
                true
            }
            Some(sub) => {
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Notifies one subscription.
    pub fn notify(&self, id: SubscriptionId, event: &E) {
        if let Some(sub) = self.subscriptions.get(&id) {
            sub.notify(event);
        }
    }

    /// Notifies every active subscription, oldest first.
    pub fn notify_all(&self, event: &E) {
        for sub in self.subscriptions.values() {
            sub.notify(event);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
