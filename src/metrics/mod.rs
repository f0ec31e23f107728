//! Metrics for the lobby keeper
//!
//! Prometheus counters, gauges and histograms covering lobby lifecycles,
//! participant traffic and matchmaking performance.

pub mod collector;

pub use collector::{
    LobbyMetrics, MetricsCollector, MetricsTimer, ParticipantMetrics, PerformanceMetrics,
    ServiceMetrics,
};
