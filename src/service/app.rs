//! Main application state and service coordination
//!
//! This module contains the AppState that owns the lobby registry, the
//! metrics collector and the background tasks of the host process.

use crate::config::{validate_config, AppConfig};
use crate::error::MatchmakingError;
use crate::lobby::{Lobby, LobbyRegistry, RegistryStats};
use crate::metrics::MetricsCollector;
use crate::service::simulation::SimulationDriver;
use crate::utils::SystemClock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Lobby types and live lobbies
    registry: Arc<LobbyRegistry>,

    /// Metrics collector shared with the registry
    metrics_collector: Arc<MetricsCollector>,

    /// Lobbies closed since startup, counted by the closed callbacks
    lobbies_closed: Arc<AtomicU64>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Build the registry and register every configured lobby type
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let registry = Arc::new(LobbyRegistry::with_clock_and_metrics(
            config.lobby.clone(),
            Arc::new(SystemClock),
            metrics_collector.clone(),
        ));

        let lobbies_closed = Arc::new(AtomicU64::new(0));
        Self::register_lobby_types(&config, &registry, &lobbies_closed)?;

        Ok(Self {
            config,
            registry,
            metrics_collector,
            lobbies_closed,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the archival sweep, the stats reporter and, when enabled, the
    /// simulation
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        *self.is_running.write().await = true;

        self.start_background_tasks();

        if self.config.simulation.enabled {
            self.start_simulation()?;
        } else {
            info!("Simulation disabled - waiting without synthetic traffic");
        }

        info!("✅ {} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {} service", self.config.service.name);

        *self.is_running.write().await = false;

        self.stop_background_tasks();

        let final_stats = self
            .registry
            .stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;
        self.metrics_collector.update_from_registry_stats(&final_stats);

        info!(
            "Final service statistics: {:?}, lobbies closed: {}",
            final_stats,
            self.lobbies_closed()
        );
        match self.metrics_collector.gather_text() {
            Ok(text) => info!("Final metrics:\n{}", text),
            Err(e) => warn!("Failed to render final metrics: {}", e),
        }

        info!("✅ {} service shutdown completed", self.config.service.name);
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the lobby registry
    pub fn registry(&self) -> Arc<LobbyRegistry> {
        self.registry.clone()
    }

    /// Get the metrics collector
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Lobbies closed since startup
    pub fn lobbies_closed(&self) -> u64 {
        self.lobbies_closed.load(Ordering::Relaxed)
    }

    fn register_lobby_types(
        config: &AppConfig,
        registry: &LobbyRegistry,
        lobbies_closed: &Arc<AtomicU64>,
    ) -> Result<(), ServiceError> {
        for settings in &config.lobby_types {
            let counter = lobbies_closed.clone();
            let options = settings
                .to_options()
                .with_closed_callback(move |lobby: &Lobby| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "Lobby {} of type '{}' closed with {} users - awaiting acknowledgements",
                        lobby.id(),
                        lobby.lobby_type(),
                        lobby.user_count()
                    );
                });

            let registered =
                registry
                    .register_type(options)
                    .map_err(|e| ServiceError::Configuration {
                        message: format!(
                            "Failed to register lobby type '{}': {}",
                            settings.lobby_type, e
                        ),
                    })?;
            if !registered {
                return Err(ServiceError::Configuration {
                    message: format!(
                        "Lobby type '{}' rejected: min_users ({}) exceeds max_users ({})",
                        settings.lobby_type, settings.min_users, settings.max_users
                    ),
                });
            }
        }

        info!("Registered {} lobby types", config.lobby_types.len());
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!("Starting background maintenance tasks...");

        // Archival sweep
        let archive_task = {
            let registry = self.registry.clone();
            let metrics_collector = self.metrics_collector.clone();
            let archive_interval = self.config.archive_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(archive_interval);
                info!("Archival sweep started ({}ms interval)", archive_interval.as_millis());

                while *is_running.read().await {
                    interval.tick().await;

                    let timer = metrics_collector.start_timer();
                    let archived = archive_removable_lobbies(&registry);
                    metrics_collector.record_archive_sweep(timer.stop());

                    if archived > 0 {
                        info!("Archived {} lobbies", archived);
                    }
                }

                info!("Archival sweep stopped");
            })
        };

        // Stats reporter
        let stats_task = {
            let registry = self.registry.clone();
            let metrics_collector = self.metrics_collector.clone();
            let stats_interval = self.config.stats_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(stats_interval);
                let start_time = Instant::now();
                info!("Stats reporter started ({}s interval)", stats_interval.as_secs());

                while *is_running.read().await {
                    interval.tick().await;

                    metrics_collector.set_uptime(start_time.elapsed());
                    match registry.stats() {
                        Ok(stats) => {
                            log_stats(&stats);
                            metrics_collector.update_from_registry_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get registry stats: {}", e);
                        }
                    }
                }

                info!("Stats reporter stopped");
            })
        };

        self.background_tasks.push(archive_task);
        self.background_tasks.push(stats_task);

        info!(
            "{} background maintenance tasks started successfully",
            self.background_tasks.len()
        );
    }

    fn start_simulation(&mut self) -> Result<(), ServiceError> {
        let lobby_types = self
            .registry
            .lobby_types()
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to list lobby types: {}", e),
            })?;

        let driver = SimulationDriver::new(
            self.registry.clone(),
            self.config.simulation.clone(),
            lobby_types,
        );

        self.background_tasks.push(tokio::spawn(async move {
            let report = driver.run().await;
            info!(
                "Simulation finished - joined: {}, acknowledged: {}, evicted: {}, failed: {}",
                report.joined, report.acknowledged, report.evicted, report.failed
            );
        }));
        Ok(())
    }

    /// Stop all background tasks
    fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Archive every removable lobby. Returns how many were archived.
///
/// A lobby archived concurrently by someone else is skipped.
pub fn archive_removable_lobbies(registry: &LobbyRegistry) -> usize {
    let lobbies = match registry.get_all(None) {
        Ok(lobbies) => lobbies,
        Err(e) => {
            warn!("Archival sweep could not list lobbies: {}", e);
            return 0;
        }
    };

    let mut archived = 0;
    for lobby in lobbies.iter().filter(|lobby| lobby.can_remove()) {
        match registry.archive(lobby.id()) {
            Ok(_) => archived += 1,
            Err(e) => match e.downcast_ref::<MatchmakingError>() {
                Some(MatchmakingError::LobbyNotFound { .. }) => {
                    debug!("Lobby {} already archived", lobby.id());
                }
                _ => warn!("Failed to archive lobby {}: {}", lobby.id(), e),
            },
        }
    }
    archived
}

fn log_stats(stats: &RegistryStats) {
    info!(
        "Registry stats - lobbies: {} (forming: {}, ready: {}, closed: {}, removable: {}), participants: {}",
        stats.total_lobbies,
        stats.forming,
        stats.ready,
        stats.closed,
        stats.removable,
        stats.participants
    );
}
