//! Per-lobby update subscriptions
//!
//! Each user identity holds at most one callback. Subscribing again under the
//! same identity replaces the previous callback. Updates published while an
//! identity has no callback are dropped; there is no queueing or replay.

use crate::types::{LobbyUpdate, UserKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Receives lobby updates for one subscriber
pub type UpdateCallback = Arc<dyn Fn(&LobbyUpdate) + Send + Sync>;

/// Publish/subscribe registry keyed by user identity
#[derive(Default)]
pub struct UpdateChannel {
    subscribers: Mutex<HashMap<UserKey, UpdateCallback>>,
}

impl UpdateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`. Returns true if it replaced an
    /// existing callback.
    pub fn subscribe(&self, key: UserKey, callback: UpdateCallback) -> bool {
        let mut subscribers = self.lock();
        let replaced = subscribers.insert(key.clone(), callback).is_some();
        debug!("Subscriber '{}' registered (replaced: {})", key, replaced);
        replaced
    }

    /// Remove the callback for `key`. Returns true if one was registered.
    pub fn unsubscribe(&self, key: &UserKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Deliver `update` once to every current subscriber.
    ///
    /// Callbacks run after the subscriber table is released, so a callback
    /// may subscribe, unsubscribe or trigger further publications.
    pub fn publish(&self, update: &LobbyUpdate) -> usize {
        let callbacks: Vec<UpdateCallback> = self.lock().values().cloned().collect();
        for callback in &callbacks {
            callback(update);
        }
        callbacks.len()
    }

    pub fn is_subscribed(&self, key: &UserKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserKey, UpdateCallback>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for UpdateChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
