//! Common types used throughout the lobby keeper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for lobbies
pub type LobbyId = Uuid;

/// An opaque user record as supplied by the caller
pub type UserRecord = Value;

/// Comparable identity of a user, extracted from its record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a key from a scalar JSON value.
    ///
    /// Strings are used verbatim; numbers and booleans use their display
    /// form, so `1` and `"1"` identify the same user. Null, arrays and
    /// objects have no identity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            Value::Bool(b) => Some(Self(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Lifecycle position of a lobby, derived from its state flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyStatus {
    /// Not enough (or too many) users to be ready
    Forming,
    /// Participant count within bounds; closure countdown running
    Ready,
    /// Grace period elapsed; no joins or leaves accepted
    Closed,
    /// Closed and every participant acknowledged; may be archived
    Removable,
}

impl std::fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyStatus::Forming => write!(f, "Forming"),
            LobbyStatus::Ready => write!(f, "Ready"),
            LobbyStatus::Closed => write!(f, "Closed"),
            LobbyStatus::Removable => write!(f, "Removable"),
        }
    }
}

/// Why a participant stopped being a member of an open lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// The user left voluntarily
    Left,
    /// The user's heartbeat expired
    Timeout,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Left => "left",
            LeaveReason::Timeout => "timeout",
        }
    }
}

/// Kind of update delivered to lobby subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    UserJoined,
    UserLeft,
    LobbyReady,
    LobbyNotReady,
    LobbyClosed,
    LobbyReadyToArchive,
}

impl UpdateKind {
    /// Human-readable description of the update
    pub fn message(&self) -> &'static str {
        match self {
            UpdateKind::UserJoined => "User has joined lobby.",
            UpdateKind::UserLeft => "User has left lobby.",
            UpdateKind::LobbyReady => "Lobby is ready.",
            UpdateKind::LobbyNotReady => "Lobby is waiting for more users.",
            UpdateKind::LobbyClosed => "Lobby is closed.",
            UpdateKind::LobbyReadyToArchive => "Lobby is ready to be archived.",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Point-in-time copy of a lobby's observable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: LobbyId,
    pub lobby_type: String,
    pub users: Vec<UserRecord>,
    pub status: LobbyStatus,
    pub is_ready: bool,
    pub time_declared_ready: Option<DateTime<Utc>>,
    pub is_closed: bool,
    pub time_closed: Option<DateTime<Utc>>,
    pub can_remove: bool,
}

/// What an update is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UpdatePayload {
    /// The user who joined or left
    User(UserRecord),
    /// The lobby as it was at the transition
    Lobby(LobbySnapshot),
}

/// Event published to lobby subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyUpdate {
    pub lobby_id: LobbyId,
    pub kind: UpdateKind,
    pub payload: UpdatePayload,
    pub timestamp: DateTime<Utc>,
}

impl LobbyUpdate {
    /// The affected user, for user-level updates
    pub fn user(&self) -> Option<&UserRecord> {
        match &self.payload {
            UpdatePayload::User(user) => Some(user),
            UpdatePayload::Lobby(_) => None,
        }
    }

    /// The lobby snapshot, for lobby-level updates
    pub fn lobby(&self) -> Option<&LobbySnapshot> {
        match &self.payload {
            UpdatePayload::Lobby(snapshot) => Some(snapshot),
            UpdatePayload::User(_) => None,
        }
    }
}
