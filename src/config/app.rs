//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! lobby-keeper service, including TOML and environment variable loading
//! and validation.

use crate::config::lobby::{LobbyDefaults, LobbyTypeSettings};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    /// Registry-wide lobby defaults
    pub lobby: LobbyDefaults,
    /// Lobby types registered at startup
    pub lobby_types: Vec<LobbyTypeSettings>,
    pub simulation: SimulationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Interval between registry stats reports in seconds
    pub stats_interval_seconds: u64,
    /// Interval between archival sweeps in milliseconds
    pub archive_interval_ms: u64,
}

/// Synthetic user traffic driven by the host binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Run the simulation on startup
    pub enabled: bool,
    /// Number of synthetic users
    pub users: usize,
    /// Delay between consecutive user arrivals in milliseconds
    pub join_interval_ms: u64,
    /// Heartbeat period of a well-behaved user in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Every n-th user stops heartbeating (0 disables)
    pub flaky_every: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            lobby: LobbyDefaults::default(),
            lobby_types: vec![
                LobbyTypeSettings::new("duel", 2, 2),
                LobbyTypeSettings::new("squad", 3, 5),
            ],
            simulation: SimulationSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "lobby-keeper".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 30,
            stats_interval_seconds: 10,
            archive_interval_ms: 1000,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            users: 12,
            join_interval_ms: 250,
            heartbeat_interval_ms: 1000,
            flaky_every: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document. Missing tables and keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Overwrite settings with any environment variables that are set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }
        if let Some(interval) = parse_env("STATS_INTERVAL_SECONDS")? {
            self.service.stats_interval_seconds = interval;
        }
        if let Some(interval) = parse_env("ARCHIVE_INTERVAL_MS")? {
            self.service.archive_interval_ms = interval;
        }

        // Lobby defaults
        if let Ok(field) = env::var("LOBBY_IDENTIFIER_FIELD") {
            self.lobby.identifier_field = field;
        }
        if let Some(timeout) = parse_env("LOBBY_USER_TIMEOUT_MS")? {
            self.lobby.user_timeout_ms = timeout;
        }
        if let Some(timeout) = parse_env("LOBBY_READY_TIMEOUT_MS")? {
            self.lobby.ready_timeout_ms = timeout;
        }
        if let Some(interval) = parse_env("LOBBY_CHECK_CURRENT_USERS_INTERVAL_MS")? {
            self.lobby.check_current_users_interval_ms = interval;
        }
        if let Some(interval) = parse_env("LOBBY_CHECK_CLOSED_STATUS_INTERVAL_MS")? {
            self.lobby.check_closed_status_interval_ms = interval;
        }

        // Simulation settings
        if let Some(enabled) = parse_env("SIMULATION_ENABLED")? {
            self.simulation.enabled = enabled;
        }
        if let Some(users) = parse_env("SIMULATION_USERS")? {
            self.simulation.users = users;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get stats reporting interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.service.stats_interval_seconds)
    }

    /// Get archival sweep interval as Duration
    pub fn archive_interval(&self) -> Duration {
        Duration::from_millis(self.service.archive_interval_ms)
    }
}

impl SimulationSettings {
    pub fn join_interval(&self) -> Duration {
        Duration::from_millis(self.join_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Whether the `index`-th user (zero-based) stops heartbeating
    pub fn is_flaky(&self, index: usize) -> bool {
        self.flaky_every > 0 && (index + 1) % self.flaky_every == 0
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate service timings
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.stats_interval_seconds == 0 {
        return Err(anyhow!("Stats interval must be greater than 0"));
    }
    if config.service.archive_interval_ms == 0 {
        return Err(anyhow!("Archive interval must be greater than 0"));
    }

    // Validate lobby defaults
    if config.lobby.identifier_field.trim().is_empty() {
        return Err(anyhow!("Lobby identifier field cannot be empty"));
    }
    for (name, value) in [
        ("user timeout", config.lobby.user_timeout_ms),
        ("ready timeout", config.lobby.ready_timeout_ms),
        (
            "check current users interval",
            config.lobby.check_current_users_interval_ms,
        ),
        (
            "check closed status interval",
            config.lobby.check_closed_status_interval_ms,
        ),
    ] {
        if value == 0 {
            return Err(anyhow!("Lobby {} must be greater than 0", name));
        }
    }

    // Validate lobby types
    let mut names = HashSet::new();
    for settings in &config.lobby_types {
        if settings.lobby_type.trim().is_empty() {
            return Err(anyhow!("Lobby type name cannot be empty"));
        }
        if !names.insert(settings.lobby_type.as_str()) {
            return Err(anyhow!("Duplicate lobby type: {}", settings.lobby_type));
        }
        if settings.max_users == 0 {
            return Err(anyhow!(
                "Lobby type '{}' must allow at least one user",
                settings.lobby_type
            ));
        }
        if settings.min_users > settings.max_users {
            return Err(anyhow!(
                "Lobby type '{}': min_users ({}) cannot exceed max_users ({})",
                settings.lobby_type,
                settings.min_users,
                settings.max_users
            ));
        }
        if settings
            .identifier_field
            .as_deref()
            .is_some_and(|field| field.trim().is_empty())
        {
            return Err(anyhow!(
                "Lobby type '{}' has an empty identifier field",
                settings.lobby_type
            ));
        }
        let overrides = [
            settings.user_timeout_ms,
            settings.ready_timeout_ms,
            settings.check_current_users_interval_ms,
            settings.check_closed_status_interval_ms,
        ];
        if overrides.contains(&Some(0)) {
            return Err(anyhow!(
                "Lobby type '{}' timeouts and intervals must be greater than 0",
                settings.lobby_type
            ));
        }
    }

    // Validate simulation settings
    if config.simulation.enabled {
        if config.lobby_types.is_empty() {
            return Err(anyhow!("Simulation requires at least one lobby type"));
        }
        if config.simulation.heartbeat_interval_ms == 0 {
            return Err(anyhow!("Simulation heartbeat interval must be greater than 0"));
        }
    }

    Ok(())
}
