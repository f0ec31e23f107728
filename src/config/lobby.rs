//! Lobby configuration
//!
//! `LobbyDefaults` supplies the registry-wide fallbacks for every lobby type;
//! `LobbyTypeSettings` is one `[[lobby_types]]` table of the config file.

use crate::lobby::provider::{IdentifierRule, LobbyTypeOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_IDENTIFIER_FIELD: &str = "id";
pub const DEFAULT_USER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CHECK_CURRENT_USERS_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_CHECK_CLOSED_STATUS_INTERVAL_MS: u64 = 1_000;

/// Registry-wide defaults applied to fields a lobby type leaves unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyDefaults {
    /// Property of the user record that identifies the user
    pub identifier_field: String,
    /// Inactivity before a user is evicted
    pub user_timeout_ms: u64,
    /// Time a lobby stays ready before it closes
    pub ready_timeout_ms: u64,
    /// Period of the heartbeat sweep
    pub check_current_users_interval_ms: u64,
    /// Period of the closure check
    pub check_closed_status_interval_ms: u64,
}

impl Default for LobbyDefaults {
    fn default() -> Self {
        Self {
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            user_timeout_ms: DEFAULT_USER_TIMEOUT_MS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            check_current_users_interval_ms: DEFAULT_CHECK_CURRENT_USERS_INTERVAL_MS,
            check_closed_status_interval_ms: DEFAULT_CHECK_CLOSED_STATUS_INTERVAL_MS,
        }
    }
}

impl LobbyDefaults {
    pub fn identifier_rule(&self) -> IdentifierRule {
        IdentifierRule::Field(self.identifier_field.clone())
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_millis(self.user_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn check_current_users_interval(&self) -> Duration {
        Duration::from_millis(self.check_current_users_interval_ms)
    }

    pub fn check_closed_status_interval(&self) -> Duration {
        Duration::from_millis(self.check_closed_status_interval_ms)
    }
}

/// One lobby type as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyTypeSettings {
    #[serde(rename = "type")]
    pub lobby_type: String,
    pub min_users: usize,
    pub max_users: usize,
    #[serde(default)]
    pub identifier_field: Option<String>,
    #[serde(default)]
    pub user_timeout_ms: Option<u64>,
    #[serde(default)]
    pub ready_timeout_ms: Option<u64>,
    #[serde(default)]
    pub check_current_users_interval_ms: Option<u64>,
    #[serde(default)]
    pub check_closed_status_interval_ms: Option<u64>,
}

impl LobbyTypeSettings {
    pub fn new(lobby_type: impl Into<String>, min_users: usize, max_users: usize) -> Self {
        Self {
            lobby_type: lobby_type.into(),
            min_users,
            max_users,
            identifier_field: None,
            user_timeout_ms: None,
            ready_timeout_ms: None,
            check_current_users_interval_ms: None,
            check_closed_status_interval_ms: None,
        }
    }

    /// Registration options for this type; unset fields stay unset so the
    /// registry applies its own defaults.
    pub fn to_options(&self) -> LobbyTypeOptions {
        LobbyTypeOptions {
            lobby_type: self.lobby_type.clone(),
            min_users: self.min_users,
            max_users: self.max_users,
            identifier: self.identifier_field.clone().map(IdentifierRule::Field),
            user_timeout: self.user_timeout_ms.map(Duration::from_millis),
            ready_timeout: self.ready_timeout_ms.map(Duration::from_millis),
            check_current_users_interval: self
                .check_current_users_interval_ms
                .map(Duration::from_millis),
            check_closed_status_interval: self
                .check_closed_status_interval_ms
                .map(Duration::from_millis),
            closed_callback: None,
        }
    }
}
