//! Error types for the lobby keeper
//!
//! Routine matchmaking outcomes (lobby full, lobby closed, user absent) are
//! reported as `false` by lobby operations and never appear here. These
//! errors cover bad input and lookups that cannot be satisfied.

use crate::types::LobbyId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Invalid lobby type configuration: {reason}")]
    InvalidLobbyType { reason: String },

    #[error("Lobby type not found: {lobby_type}")]
    LobbyTypeNotFound { lobby_type: String },

    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: LobbyId },

    #[error("Lobby id {lobby_id} matched {count} lobbies")]
    DuplicateLobbyId { lobby_id: LobbyId, count: usize },

    #[error("Lobby is not ready to be archived: {lobby_id}")]
    LobbyNotRemovable { lobby_id: LobbyId },

    #[error("Invalid user record: {reason}")]
    InvalidUser { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
