//! Test fixtures shared by the integration and load tests

use chrono::{DateTime, Utc};
use lobby_keeper::config::LobbyDefaults;
use lobby_keeper::lobby::{Lobby, LobbyRegistry};
use lobby_keeper::types::{LobbyUpdate, UpdateKind, UserRecord};
use lobby_keeper::utils::{Clock, ManualClock};
use mockall::mock;
use serde_json::json;
use std::sync::{Arc, Mutex};

mock! {
    pub Clock {}

    impl Clock for Clock {
        fn now(&self) -> DateTime<Utc>;
    }
}

/// Build a user record identified by `id`
pub fn user(id: &str) -> UserRecord {
    json!({ "id": id, "name": format!("Player {}", id) })
}

/// Build `count` users named `{prefix}-0`, `{prefix}-1`, ...
pub fn users(prefix: &str, count: usize) -> Vec<UserRecord> {
    (0..count)
        .map(|i| user(&format!("{}-{}", prefix, i)))
        .collect()
}

/// A registry on a manual clock, plus a handle to move that clock
pub fn manual_registry() -> (LobbyRegistry, ManualClock) {
    let clock = ManualClock::default();
    let registry = LobbyRegistry::with_clock(LobbyDefaults::default(), Arc::new(clock.clone()));
    (registry, clock)
}

/// Subscriber that records every update it receives
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    updates: Arc<Mutex<Vec<LobbyUpdate>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this recorder to `lobby` under `subscriber`'s identity
    pub fn attach(&self, lobby: &Lobby, subscriber: &UserRecord) {
        let updates = self.updates.clone();
        lobby.subscribe(subscriber, move |update: &LobbyUpdate| {
            if let Ok(mut updates) = updates.lock() {
                updates.push(update.clone());
            }
        });
    }

    pub fn updates(&self) -> Vec<LobbyUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<UpdateKind> {
        self.updates().iter().map(|update| update.kind).collect()
    }

    pub fn count_of(&self, kind: UpdateKind) -> usize {
        self.updates()
            .iter()
            .filter(|update| update.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.clear();
        }
    }
}
