//! A user's membership record inside a lobby

use crate::types::{UserKey, UserRecord};
use chrono::{DateTime, Utc};

/// A user tracked for heartbeat and closure acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    user: UserRecord,
    key: UserKey,
    join_time: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    closure_acknowledged: bool,
}

impl Participant {
    pub fn new(user: UserRecord, key: UserKey, now: DateTime<Utc>) -> Self {
        Self {
            user,
            key,
            join_time: now,
            last_heartbeat: now,
            closure_acknowledged: false,
        }
    }

    /// The wrapped user record
    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    pub fn key(&self) -> &UserKey {
        &self.key
    }

    pub fn join_time(&self) -> DateTime<Utc> {
        self.join_time
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.last_heartbeat
    }

    pub fn has_acknowledged_closure(&self) -> bool {
        self.closure_acknowledged
    }

    /// Record a heartbeat. Never moves the heartbeat backwards.
    pub fn check_in(&mut self, now: DateTime<Utc>) {
        if now > self.last_heartbeat {
            self.last_heartbeat = now;
        }
    }

    pub fn acknowledge_lobby_closure(&mut self) {
        self.closure_acknowledged = true;
    }

    /// Whether the heartbeat is older than `timeout` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        match self.last_heartbeat.checked_add_signed(timeout) {
            Some(deadline) => deadline < now,
            None => false,
        }
    }
}
