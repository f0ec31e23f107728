//! Lobby management for the lobby keeper
//!
//! This module handles lobby type registration, matchmaking, and the
//! per-lobby state machine with its periodic checks and update delivery.

pub mod instance;
pub mod participant;
pub mod provider;
pub mod registry;
pub mod timer;
pub mod updates;

// Re-export commonly used types
pub use instance::Lobby;
pub use participant::Participant;
pub use provider::{ClosedCallback, IdentifierRule, LobbyTypeConfig, LobbyTypeOptions};
pub use registry::{LobbyRegistry, RegistryStats};
pub use timer::TimerService;
pub use updates::{UpdateCallback, UpdateChannel};
