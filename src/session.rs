//! Live subscriptions to the term collection.

use crate::models::Term;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type TermsCallback = Arc<dyn Fn(Vec<Term>) + Send + Sync>;

type SubscriberMap = Mutex<HashMap<String, TermsCallback>>;

#[derive(Clone, Default)]
pub struct SubscriptionManager {
    subscribers: Arc<SubscriberMap>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. The caller is responsible for the initial push.
    pub fn open(&self, callback: TermsCallback) -> Subscription {
        let subscription_id = Uuid::new_v4().to_string();
        lock_map(&self.subscribers).insert(subscription_id.clone(), callback);
        tracing::debug!(subscription_id = %subscription_id, "subscriber attached");

        Subscription {
            subscription_id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Pushes the full collection to every subscriber. Callbacks run outside
    /// the registry lock so they may re-enter the store.
    pub fn publish(&self, terms: &[Term]) {
        let callbacks: Vec<TermsCallback> = lock_map(&self.subscribers).values().cloned().collect();
        for callback in callbacks {
            callback(terms.to_vec());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock_map(&self.subscribers).len()
    }
}

fn lock_map(map: &SubscriberMap) -> std::sync::MutexGuard<'_, HashMap<String, TermsCallback>> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle for a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    subscription_id: String,
    subscribers: Weak<SubscriberMap>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.subscription_id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock_map(&subscribers).remove(&self.subscription_id);
            tracing::debug!(subscription_id = %self.subscription_id, "subscriber detached");
        }
    }
}

/// Bridges pushes into an async channel for consumers running on tokio.
pub fn channel_callback() -> (TermsCallback, mpsc::UnboundedReceiver<Vec<Term>>) {
    let (sender, receiver) = mpsc::unbounded_channel::<Vec<Term>>();
    let callback: TermsCallback = Arc::new(move |terms: Vec<Term>| {
        if sender.send(terms).is_err() {
            tracing::debug!("subscription receiver closed; dropping push");
        }
    });
    (callback, receiver)
}
