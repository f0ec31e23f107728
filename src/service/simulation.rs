//! Synthetic user traffic for the host binary
//!
//! Each simulated user joins a lobby through the registry, subscribes to it
//! and heartbeats until the lobby closes, at which point it acknowledges the
//! closure and unsubscribes. Every `flaky_every`-th user goes silent after
//! joining and is eventually evicted.

use crate::config::SimulationSettings;
use crate::lobby::{Lobby, LobbyRegistry};
use crate::types::{LobbyUpdate, UpdateKind, UserRecord};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How a simulated user's session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// Saw the lobby close and acknowledged it
    Acknowledged,
    /// Removed from the lobby after going silent
    Evicted,
}

/// Totals over every simulated user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Users placed in a lobby
    pub joined: usize,
    pub acknowledged: usize,
    pub evicted: usize,
    /// Users the registry could not place, or whose task failed
    pub failed: usize,
}

/// Drives a fixed population of synthetic users against a registry
pub struct SimulationDriver {
    registry: Arc<LobbyRegistry>,
    settings: SimulationSettings,
    lobby_types: Vec<String>,
}

impl SimulationDriver {
    pub fn new(
        registry: Arc<LobbyRegistry>,
        settings: SimulationSettings,
        lobby_types: Vec<String>,
    ) -> Self {
        Self {
            registry,
            settings,
            lobby_types,
        }
    }

    /// The record of the `index`-th simulated user
    pub fn user_record(index: usize) -> UserRecord {
        json!({
            "id": format!("sim-{}", index),
            "name": format!("Simulated user {}", index),
        })
    }

    /// Spawn every user, wait for all of them to finish, and tally outcomes.
    ///
    /// Users assigned to a lobby that never closes run until the driver's
    /// task is aborted.
    pub async fn run(self) -> SimulationReport {
        let mut report = SimulationReport::default();
        if self.lobby_types.is_empty() {
            warn!("Simulation has no lobby types to join");
            return report;
        }

        info!(
            "Starting simulation - users: {}, lobby types: {:?}",
            self.settings.users, self.lobby_types
        );

        let mut users = JoinSet::new();
        for index in 0..self.settings.users {
            let lobby_type = &self.lobby_types[index % self.lobby_types.len()];
            let user = Self::user_record(index);

            match self.registry.join(lobby_type, &user) {
                Ok(lobby) => {
                    report.joined += 1;
                    debug!(
                        "Simulated user {} joined lobby {} ({})",
                        index,
                        lobby.id(),
                        lobby_type
                    );
                    let settings = self.settings.clone();
                    let flaky = settings.is_flaky(index);
                    users.spawn(run_user(lobby, user, settings, flaky));
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Simulated user {} could not join '{}': {}", index, lobby_type, e);
                }
            }

            if !self.settings.join_interval().is_zero() {
                tokio::time::sleep(self.settings.join_interval()).await;
            }
        }

        while let Some(result) = users.join_next().await {
            match result {
                Ok(UserOutcome::Acknowledged) => report.acknowledged += 1,
                Ok(UserOutcome::Evicted) => report.evicted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Simulated user task failed: {}", e);
                }
            }
        }

        report
    }
}

async fn run_user(
    lobby: Lobby,
    user: UserRecord,
    settings: SimulationSettings,
    flaky: bool,
) -> UserOutcome {
    let (tx, mut updates) = mpsc::unbounded_channel::<LobbyUpdate>();
    lobby.subscribe(&user, move |update: &LobbyUpdate| {
        let _ = tx.send(update.clone());
    });

    let mut heartbeat = tokio::time::interval(settings.heartbeat_interval());
    let outcome = loop {
        tokio::select! {
            _ = heartbeat.tick(), if !flaky => {
                if !lobby.check_in(&user) {
                    // Evicted before the departure update was observed
                    break UserOutcome::Evicted;
                }
            }
            update = updates.recv() => match update {
                Some(update) if update.kind == UpdateKind::LobbyClosed => {
                    lobby.acknowledge_lobby_closure(&user);
                    break UserOutcome::Acknowledged;
                }
                Some(update) if update.kind == UpdateKind::UserLeft && update.user() == Some(&user) => {
                    break UserOutcome::Evicted;
                }
                Some(_) => {}
                None => break UserOutcome::Evicted,
            }
        }
    };

    lobby.unsubscribe(&user);
    debug!("Simulated user {} finished: {:?}", user["id"], outcome);
    outcome
}
