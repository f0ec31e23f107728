//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for lobby lifecycles, participant
//! traffic and matchmaking performance.

use crate::lobby::registry::RegistryStats;
use crate::types::{LeaveReason, LobbyStatus};
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the lobby keeper
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Lobby lifecycle metrics
    lobby_metrics: LobbyMetrics,

    /// Participant traffic metrics
    participant_metrics: ParticipantMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Registered lobby types
    pub lobby_types: IntGauge,
}

/// Lobby lifecycle metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Lobbies held by the registry, by type
    pub active_lobbies: IntGaugeVec,

    /// Lobbies held by the registry, by status
    pub lobbies_by_status: IntGaugeVec,

    /// Total lobbies created
    pub lobbies_created_total: IntCounterVec,

    /// Total lobbies closed
    pub lobbies_closed_total: IntCounterVec,

    /// Total lobbies whose closure every participant acknowledged
    pub lobbies_removable_total: IntCounterVec,

    /// Total lobbies archived out of the registry
    pub lobbies_archived_total: IntCounterVec,

    /// Ready/not-ready transitions
    pub readiness_transitions_total: IntCounterVec,

    /// Time a lobby spent ready before it closed
    pub ready_duration_seconds: HistogramVec,
}

/// Participant traffic metrics
#[derive(Clone)]
pub struct ParticipantMetrics {
    /// Participants across every lobby in the registry
    pub participants: IntGauge,

    /// Total users admitted into a lobby
    pub joins_total: IntCounterVec,

    /// Total departures by reason (left, timeout)
    pub departures_total: IntCounterVec,

    /// Total joins a lobby refused, by reason (full, closed)
    pub join_rejections_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Registry join duration
    pub matchmaking_duration: HistogramVec,

    /// Archival sweep duration
    pub archive_sweep_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let participant_metrics = ParticipantMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            participant_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn participant(&self) -> &ParticipantMetrics {
        &self.participant_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update point-in-time gauges from registry stats
    pub fn update_from_registry_stats(&self, stats: &RegistryStats) {
        self.service_metrics
            .lobby_types
            .set(stats.lobby_types as i64);

        for (status, count) in [
            (LobbyStatus::Forming, stats.forming),
            (LobbyStatus::Ready, stats.ready),
            (LobbyStatus::Closed, stats.closed),
            (LobbyStatus::Removable, stats.removable),
        ] {
            self.lobby_metrics
                .lobbies_by_status
                .with_label_values(&[status_label(status)])
                .set(count as i64);
        }

        self.participant_metrics
            .participants
            .set(stats.participants as i64);
    }

    /// Record a lobby being created by the registry
    pub fn record_lobby_created(&self, lobby_type: &str) {
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[lobby_type])
            .inc();

        self.lobby_metrics
            .active_lobbies
            .with_label_values(&[lobby_type])
            .inc();
    }

    /// Record a lobby closing after `ready_for` in the ready state
    pub fn record_lobby_closed(&self, lobby_type: &str, ready_for: Duration) {
        self.lobby_metrics
            .lobbies_closed_total
            .with_label_values(&[lobby_type])
            .inc();

        self.lobby_metrics
            .ready_duration_seconds
            .with_label_values(&[lobby_type])
            .observe(ready_for.as_secs_f64());
    }

    pub fn record_lobby_removable(&self, lobby_type: &str) {
        self.lobby_metrics
            .lobbies_removable_total
            .with_label_values(&[lobby_type])
            .inc();
    }

    /// Record a lobby leaving the registry
    pub fn record_lobby_archived(&self, lobby_type: &str) {
        self.lobby_metrics
            .lobbies_archived_total
            .with_label_values(&[lobby_type])
            .inc();

        self.lobby_metrics
            .active_lobbies
            .with_label_values(&[lobby_type])
            .dec();
    }

    pub fn record_readiness_change(&self, lobby_type: &str, ready: bool) {
        let transition = if ready { "ready" } else { "not_ready" };

        self.lobby_metrics
            .readiness_transitions_total
            .with_label_values(&[lobby_type, transition])
            .inc();
    }

    pub fn record_user_joined(&self, lobby_type: &str) {
        self.participant_metrics
            .joins_total
            .with_label_values(&[lobby_type])
            .inc();
    }

    pub fn record_user_left(&self, lobby_type: &str, reason: LeaveReason) {
        self.participant_metrics
            .departures_total
            .with_label_values(&[lobby_type, reason.as_str()])
            .inc();
    }

    pub fn record_join_rejected(&self, lobby_type: &str, reason: &str) {
        self.participant_metrics
            .join_rejections_total
            .with_label_values(&[lobby_type, reason])
            .inc();
    }

    /// Record a registry join, labelled by how the user was placed
    pub fn record_matchmaking(&self, lobby_type: &str, outcome: &str, duration: Duration) {
        self.performance_metrics
            .matchmaking_duration
            .with_label_values(&[lobby_type, outcome])
            .observe(duration.as_secs_f64());
    }

    pub fn record_archive_sweep(&self, duration: Duration) {
        self.performance_metrics
            .archive_sweep_duration
            .observe(duration.as_secs_f64());
    }

    pub fn set_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

fn status_label(status: LobbyStatus) -> &'static str {
    match status {
        LobbyStatus::Forming => "forming",
        LobbyStatus::Ready => "ready",
        LobbyStatus::Closed => "closed",
        LobbyStatus::Removable => "removable",
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("lobby_keeper_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let lobby_types =
            IntGauge::new("lobby_keeper_lobby_types", "Registered lobby types")?;
        registry.register(Box::new(lobby_types.clone()))?;

        Ok(Self {
            uptime_seconds,
            lobby_types,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGaugeVec::new(
            Opts::new("lobby_keeper_active_lobbies", "Lobbies held by the registry"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_by_status = IntGaugeVec::new(
            Opts::new("lobby_keeper_lobbies", "Lobbies held by the registry by status"),
            &["status"],
        )?;
        registry.register(Box::new(lobbies_by_status.clone()))?;

        let lobbies_created_total = IntCounterVec::new(
            Opts::new("lobby_keeper_lobbies_created_total", "Total lobbies created"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_closed_total = IntCounterVec::new(
            Opts::new("lobby_keeper_lobbies_closed_total", "Total lobbies closed"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(lobbies_closed_total.clone()))?;

        let lobbies_removable_total = IntCounterVec::new(
            Opts::new(
                "lobby_keeper_lobbies_removable_total",
                "Total lobbies ready to be archived",
            ),
            &["lobby_type"],
        )?;
        registry.register(Box::new(lobbies_removable_total.clone()))?;

        let lobbies_archived_total = IntCounterVec::new(
            Opts::new("lobby_keeper_lobbies_archived_total", "Total lobbies archived"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(lobbies_archived_total.clone()))?;

        let readiness_transitions_total = IntCounterVec::new(
            Opts::new(
                "lobby_keeper_readiness_transitions_total",
                "Lobby readiness transitions",
            ),
            &["lobby_type", "transition"],
        )?;
        registry.register(Box::new(readiness_transitions_total.clone()))?;

        let ready_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lobby_keeper_ready_duration_seconds",
                "Time a lobby spent ready before closing",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["lobby_type"],
        )?;
        registry.register(Box::new(ready_duration_seconds.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_by_status,
            lobbies_created_total,
            lobbies_closed_total,
            lobbies_removable_total,
            lobbies_archived_total,
            readiness_transitions_total,
            ready_duration_seconds,
        })
    }
}

impl ParticipantMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants = IntGauge::new(
            "lobby_keeper_participants",
            "Participants across all lobbies",
        )?;
        registry.register(Box::new(participants.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("lobby_keeper_joins_total", "Total users admitted into lobbies"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let departures_total = IntCounterVec::new(
            Opts::new("lobby_keeper_departures_total", "Total users leaving lobbies"),
            &["lobby_type", "reason"],
        )?;
        registry.register(Box::new(departures_total.clone()))?;

        let join_rejections_total = IntCounterVec::new(
            Opts::new(
                "lobby_keeper_join_rejections_total",
                "Total joins refused by a lobby",
            ),
            &["lobby_type", "reason"],
        )?;
        registry.register(Box::new(join_rejections_total.clone()))?;

        Ok(Self {
            participants,
            joins_total,
            departures_total,
            join_rejections_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matchmaking_duration = HistogramVec::new(
            HistogramOpts::new(
                "lobby_keeper_matchmaking_duration_seconds",
                "Registry join duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["lobby_type", "outcome"],
        )?;
        registry.register(Box::new(matchmaking_duration.clone()))?;

        let archive_sweep_duration = Histogram::with_opts(
            HistogramOpts::new(
                "lobby_keeper_archive_sweep_duration_seconds",
                "Archival sweep duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(archive_sweep_duration.clone()))?;

        Ok(Self {
            matchmaking_duration,
            archive_sweep_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
