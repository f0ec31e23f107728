//! Configuration management for the lobby-keeper service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;
pub mod lobby;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings, SimulationSettings};
pub use lobby::{LobbyDefaults, LobbyTypeSettings};
