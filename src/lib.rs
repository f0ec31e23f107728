//! Lobby Keeper - lobby matchmaking core
//!
//! This crate groups users into bounded-capacity lobbies by type, declares a
//! lobby ready once enough users have joined, closes it after a grace
//! period, evicts users whose heartbeat lapses, and reports when every user
//! has acknowledged closure so the lobby can be archived.

pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use lobby::{Lobby, LobbyRegistry, LobbyTypeOptions};
pub use utils::{Clock, ManualClock, SystemClock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
