//! Lobby type configuration
//!
//! A lobby type is registered from `LobbyTypeOptions` (every field but the
//! name and the capacity bounds optional) and resolved against the registry
//! defaults into an immutable `LobbyTypeConfig`.

use crate::config::LobbyDefaults;
use crate::error::{MatchmakingError, Result};
use crate::lobby::instance::Lobby;
use crate::types::{UserKey, UserRecord};
use crate::utils::to_time_delta;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Called once, synchronously, when a lobby of the type closes
pub type ClosedCallback = Arc<dyn Fn(&Lobby) + Send + Sync>;

/// Extracts a user's identity from its record
pub type IdentifierFn = Arc<dyn Fn(&UserRecord) -> Option<UserKey> + Send + Sync>;

/// How a user's identity is read from its record
#[derive(Clone)]
pub enum IdentifierRule {
    /// Read a top-level property of the record
    Field(String),
    /// Apply an injected pure function
    Custom(IdentifierFn),
}

impl IdentifierRule {
    pub fn field(name: impl Into<String>) -> Self {
        IdentifierRule::Field(name.into())
    }

    pub fn custom<F>(extract: F) -> Self
    where
        F: Fn(&UserRecord) -> Option<UserKey> + Send + Sync + 'static,
    {
        IdentifierRule::Custom(Arc::new(extract))
    }

    /// Identity of `user`, if it has one under this rule
    pub fn extract(&self, user: &UserRecord) -> Option<UserKey> {
        match self {
            IdentifierRule::Field(name) => user.get(name).and_then(UserKey::from_value),
            IdentifierRule::Custom(extract) => extract(user),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            IdentifierRule::Field(name) if name.trim().is_empty() => {
                Err(MatchmakingError::InvalidLobbyType {
                    reason: "Identifier field name cannot be empty".to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for IdentifierRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierRule::Field(name) => f.debug_tuple("Field").field(name).finish(),
            IdentifierRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Input to `LobbyRegistry::register_type`
#[derive(Clone)]
pub struct LobbyTypeOptions {
    pub lobby_type: String,
    pub min_users: usize,
    pub max_users: usize,
    pub identifier: Option<IdentifierRule>,
    pub user_timeout: Option<Duration>,
    pub ready_timeout: Option<Duration>,
    pub check_current_users_interval: Option<Duration>,
    pub check_closed_status_interval: Option<Duration>,
    pub closed_callback: Option<ClosedCallback>,
}

impl LobbyTypeOptions {
    pub fn new(lobby_type: impl Into<String>, min_users: usize, max_users: usize) -> Self {
        Self {
            lobby_type: lobby_type.into(),
            min_users,
            max_users,
            identifier: None,
            user_timeout: None,
            ready_timeout: None,
            check_current_users_interval: None,
            check_closed_status_interval: None,
            closed_callback: None,
        }
    }

    pub fn with_identifier(mut self, rule: IdentifierRule) -> Self {
        self.identifier = Some(rule);
        self
    }

    pub fn with_identifier_field(self, name: impl Into<String>) -> Self {
        self.with_identifier(IdentifierRule::field(name))
    }

    pub fn with_user_timeout(mut self, timeout: Duration) -> Self {
        self.user_timeout = Some(timeout);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    pub fn with_check_current_users_interval(mut self, interval: Duration) -> Self {
        self.check_current_users_interval = Some(interval);
        self
    }

    pub fn with_check_closed_status_interval(mut self, interval: Duration) -> Self {
        self.check_closed_status_interval = Some(interval);
        self
    }

    pub fn with_closed_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Lobby) + Send + Sync + 'static,
    {
        self.closed_callback = Some(Arc::new(callback));
        self
    }

    /// Check the fields that make a registration invalid outright.
    ///
    /// `min_users > max_users` is not an error here; the registry reports it
    /// as an unsuccessful registration.
    pub fn validate(&self) -> Result<()> {
        if self.lobby_type.trim().is_empty() {
            return Err(MatchmakingError::InvalidLobbyType {
                reason: "Lobby type name cannot be empty".to_string(),
            }
            .into());
        }

        if self.max_users == 0 {
            return Err(MatchmakingError::InvalidLobbyType {
                reason: format!("Lobby type '{}' must allow at least one user", self.lobby_type),
            }
            .into());
        }

        if let Some(rule) = &self.identifier {
            rule.validate()?;
        }

        for (name, interval) in [
            ("check_current_users_interval", self.check_current_users_interval),
            ("check_closed_status_interval", self.check_closed_status_interval),
        ] {
            if interval == Some(Duration::ZERO) {
                return Err(MatchmakingError::InvalidLobbyType {
                    reason: format!("{} must be greater than 0", name),
                }
                .into());
            }
        }

        for (name, timeout) in [
            ("user_timeout", self.user_timeout),
            ("ready_timeout", self.ready_timeout),
        ] {
            if let Some(timeout) = timeout {
                if chrono::Duration::from_std(timeout).is_err() {
                    return Err(MatchmakingError::InvalidLobbyType {
                        reason: format!("{} of {:?} is out of range", name, timeout),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    pub fn has_valid_capacity(&self) -> bool {
        self.min_users <= self.max_users
    }
}

impl fmt::Debug for LobbyTypeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobbyTypeOptions")
            .field("lobby_type", &self.lobby_type)
            .field("min_users", &self.min_users)
            .field("max_users", &self.max_users)
            .field("identifier", &self.identifier)
            .field("user_timeout", &self.user_timeout)
            .field("ready_timeout", &self.ready_timeout)
            .field("check_current_users_interval", &self.check_current_users_interval)
            .field("check_closed_status_interval", &self.check_closed_status_interval)
            .field("closed_callback", &self.closed_callback.is_some())
            .finish()
    }
}

fn noop_closed_callback() -> ClosedCallback {
    Arc::new(|_: &Lobby| {})
}

/// Resolved, immutable configuration of a registered lobby type
#[derive(Clone)]
pub struct LobbyTypeConfig {
    pub lobby_type: String,
    pub identifier: IdentifierRule,
    pub user_timeout: chrono::Duration,
    pub ready_timeout: chrono::Duration,
    pub check_current_users_interval: Duration,
    pub check_closed_status_interval: Duration,
    pub min_users: usize,
    pub max_users: usize,
    pub closed_callback: ClosedCallback,
}

impl LobbyTypeConfig {
    /// Validate `options` and fill unset fields from `defaults`
    pub fn resolve(options: LobbyTypeOptions, defaults: &LobbyDefaults) -> Result<Self> {
        options.validate()?;

        if !options.has_valid_capacity() {
            return Err(MatchmakingError::InvalidLobbyType {
                reason: format!(
                    "min_users ({}) cannot exceed max_users ({})",
                    options.min_users, options.max_users
                ),
            }
            .into());
        }

        let identifier = options
            .identifier
            .unwrap_or_else(|| defaults.identifier_rule());
        identifier.validate()?;

        let check_current_users_interval = options
            .check_current_users_interval
            .unwrap_or_else(|| defaults.check_current_users_interval());
        let check_closed_status_interval = options
            .check_closed_status_interval
            .unwrap_or_else(|| defaults.check_closed_status_interval());
        if check_current_users_interval.is_zero() || check_closed_status_interval.is_zero() {
            return Err(MatchmakingError::InvalidLobbyType {
                reason: "Check intervals must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(Self {
            lobby_type: options.lobby_type,
            identifier,
            user_timeout: to_time_delta(
                options.user_timeout.unwrap_or_else(|| defaults.user_timeout()),
            ),
            ready_timeout: to_time_delta(
                options.ready_timeout.unwrap_or_else(|| defaults.ready_timeout()),
            ),
            check_current_users_interval,
            check_closed_status_interval,
            min_users: options.min_users,
            max_users: options.max_users,
            closed_callback: options.closed_callback.unwrap_or_else(noop_closed_callback),
        })
    }

    /// Identity of `user` under this type's identifier rule
    pub fn user_key(&self, user: &UserRecord) -> Option<UserKey> {
        self.identifier.extract(user)
    }

    /// Whether `count` participants satisfy the readiness bounds
    pub fn is_within_bounds(&self, count: usize) -> bool {
        self.min_users <= count && count <= self.max_users
    }
}

impl fmt::Debug for LobbyTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobbyTypeConfig")
            .field("lobby_type", &self.lobby_type)
            .field("identifier", &self.identifier)
            .field("user_timeout", &self.user_timeout)
            .field("ready_timeout", &self.ready_timeout)
            .field("check_current_users_interval", &self.check_current_users_interval)
            .field("check_closed_status_interval", &self.check_closed_status_interval)
            .field("min_users", &self.min_users)
            .field("max_users", &self.max_users)
            .finish_non_exhaustive()
    }
}
