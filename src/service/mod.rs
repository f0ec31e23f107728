//! Service layer for the lobby-keeper host
//!
//! This module contains the main application state, background task
//! management and the synthetic traffic driver.

pub mod app;
pub mod simulation;

pub use app::{archive_removable_lobbies, AppState, ServiceError};
pub use simulation::{SimulationDriver, SimulationReport, UserOutcome};
