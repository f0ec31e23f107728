//! Lobby registry: lobby types and matchmaking
//!
//! The registry owns the registered lobby types and every live lobby. A join
//! is routed to the first open lobby of the requested type that accepts the
//! user, in creation order, or to a freshly created lobby when none does.
//!
//! Both tables sit behind `RwLock`s. Readers clone the `Arc`-backed lobby
//! handles out of the lock, so an append never disturbs a traversal in
//! progress. Lobby operations (which may run subscriber callbacks) are
//! never invoked while a registry lock is held, except on a lobby that has
//! just been created and has no subscribers yet.

use crate::config::LobbyDefaults;
use crate::error::{MatchmakingError, Result};
use crate::lobby::instance::Lobby;
use crate::lobby::provider::{LobbyTypeConfig, LobbyTypeOptions};
use crate::metrics::MetricsCollector;
use crate::types::{LobbyId, LobbyStatus, UserRecord};
use crate::utils::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Point-in-time counts across the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered lobby types
    pub lobby_types: usize,
    /// Lobbies held by the registry
    pub total_lobbies: usize,
    pub forming: usize,
    pub ready: usize,
    pub closed: usize,
    pub removable: usize,
    /// Participants across every lobby
    pub participants: usize,
}

/// Owner of lobby types and live lobbies
pub struct LobbyRegistry {
    /// Defaults applied to fields a registration leaves unset
    defaults: LobbyDefaults,
    /// Resolved lobby types by name
    lobby_types: RwLock<HashMap<String, Arc<LobbyTypeConfig>>>,
    /// Live lobbies in creation order
    lobbies: RwLock<Vec<Lobby>>,
    /// Time source handed to every lobby
    clock: Arc<dyn Clock>,
    /// Metrics collector for recording lobby activity
    metrics_collector: Arc<MetricsCollector>,
}

impl LobbyRegistry {
    /// Create a registry on the system clock
    pub fn new(defaults: LobbyDefaults) -> Self {
        Self::with_clock(defaults, Arc::new(SystemClock))
    }

    /// Create a registry whose lobbies read time from `clock`
    pub fn with_clock(defaults: LobbyDefaults, clock: Arc<dyn Clock>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_clock_and_metrics(defaults, clock, metrics_collector)
    }

    /// Create a registry with a time source and a shared metrics collector
    pub fn with_clock_and_metrics(
        defaults: LobbyDefaults,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            defaults,
            lobby_types: RwLock::new(HashMap::new()),
            lobbies: RwLock::new(Vec::new()),
            clock,
            metrics_collector,
        }
    }

    /// Register a lobby type, replacing any earlier type of the same name.
    ///
    /// Invalid options are an error and register nothing. A `min_users`
    /// above `max_users` is reported as `Ok(false)` and also registers
    /// nothing.
    pub fn register_type(&self, options: LobbyTypeOptions) -> Result<bool> {
        options.validate()?;

        if !options.has_valid_capacity() {
            warn!(
                "Rejected lobby type '{}': min_users ({}) exceeds max_users ({})",
                options.lobby_type, options.min_users, options.max_users
            );
            return Ok(false);
        }

        let config = Arc::new(LobbyTypeConfig::resolve(options, &self.defaults)?);
        let name = config.lobby_type.clone();
        let replaced = self
            .write_types()?
            .insert(name.clone(), config.clone())
            .is_some();

        info!(
            "Registered lobby type '{}' - users: {}..={}, user_timeout: {}ms, ready_timeout: {}ms{}",
            name,
            config.min_users,
            config.max_users,
            config.user_timeout.num_milliseconds(),
            config.ready_timeout.num_milliseconds(),
            if replaced { " (replaced)" } else { "" }
        );
        Ok(true)
    }

    /// Place `user` in a lobby of `lobby_type`.
    ///
    /// An open lobby already holding the user is returned unchanged.
    /// Otherwise the user joins the first open lobby that accepts, in
    /// creation order, or a new lobby is created for them.
    pub fn join(&self, lobby_type: &str, user: &UserRecord) -> Result<Lobby> {
        let timer = self.metrics_collector.start_timer();
        let config = self.lobby_type(lobby_type)?;
        let key = config
            .user_key(user)
            .ok_or_else(|| MatchmakingError::InvalidUser {
                reason: format!(
                    "User has no identity under the rules of lobby type '{}'",
                    lobby_type
                ),
            })?;

        let mut seen = 0;
        loop {
            let (candidates, total) = self.open_lobbies_since(lobby_type, seen)?;

            if let Some(lobby) = candidates.iter().find(|lobby| lobby.has_user(user)) {
                debug!("User '{}' already in lobby {}", key, lobby.id());
                self.metrics_collector
                    .record_matchmaking(lobby_type, "existing", timer.elapsed());
                return Ok(lobby.clone());
            }

            if let Some(lobby) = candidates.iter().find(|lobby| lobby.join(user)) {
                debug!("User '{}' placed in existing lobby {}", key, lobby.id());
                self.metrics_collector
                    .record_matchmaking(lobby_type, "joined", timer.elapsed());
                return Ok(lobby.clone());
            }

            let mut lobbies = self.write_lobbies()?;
            if lobbies.len() != total {
                // Lobbies were appended since the snapshot; try those first.
                seen = total;
                continue;
            }

            let lobby = Lobby::with_metrics(
                lobby_type,
                config.clone(),
                self.clock.clone(),
                self.metrics_collector.clone(),
            );
            if !lobby.join(user) {
                return Err(MatchmakingError::InternalError {
                    message: format!("New lobby {} refused its first user", lobby.id()),
                }
                .into());
            }
            lobbies.push(lobby.clone());
            drop(lobbies);

            info!(
                "Created lobby {} of type '{}' for user '{}'",
                lobby.id(),
                lobby_type,
                key
            );
            self.metrics_collector.record_lobby_created(lobby_type);
            self.metrics_collector
                .record_matchmaking(lobby_type, "created", timer.elapsed());
            return Ok(lobby);
        }
    }

    /// Look up a lobby by id
    pub fn get(&self, lobby_id: LobbyId) -> Result<Lobby> {
        let lobbies = self.read_lobbies()?;
        let mut matches = lobbies.iter().filter(|lobby| lobby.id() == lobby_id);

        match (matches.next(), matches.count()) {
            (Some(lobby), 0) => Ok(lobby.clone()),
            (Some(_), extra) => Err(MatchmakingError::DuplicateLobbyId {
                lobby_id,
                count: extra + 1,
            }
            .into()),
            (None, _) => Err(MatchmakingError::LobbyNotFound { lobby_id }.into()),
        }
    }

    /// Every lobby, or only those holding `user`, in creation order
    pub fn get_all(&self, user: Option<&UserRecord>) -> Result<Vec<Lobby>> {
        let lobbies = self.read_lobbies()?.clone();

        Ok(match user {
            Some(user) => lobbies
                .into_iter()
                .filter(|lobby| lobby.has_user(user))
                .collect(),
            None => lobbies,
        })
    }

    /// Remove a removable lobby from the registry
    pub fn archive(&self, lobby_id: LobbyId) -> Result<Lobby> {
        let lobby = {
            let mut lobbies = self.write_lobbies()?;
            let index = lobbies
                .iter()
                .position(|lobby| lobby.id() == lobby_id)
                .ok_or(MatchmakingError::LobbyNotFound { lobby_id })?;

            if !lobbies[index].can_remove() {
                return Err(MatchmakingError::LobbyNotRemovable { lobby_id }.into());
            }
            lobbies.remove(index)
        };

        info!(
            "Archived lobby {} of type '{}'",
            lobby.id(),
            lobby.lobby_type()
        );
        self.metrics_collector.record_lobby_archived(lobby.lobby_type());
        Ok(lobby)
    }

    /// Resolved configuration of a registered type
    pub fn lobby_type(&self, name: &str) -> Result<Arc<LobbyTypeConfig>> {
        self.read_types()?.get(name).cloned().ok_or_else(|| {
            MatchmakingError::LobbyTypeNotFound {
                lobby_type: name.to_string(),
            }
            .into()
        })
    }

    /// Names of the registered types, sorted
    pub fn lobby_types(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read_types()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn defaults(&self) -> &LobbyDefaults {
        &self.defaults
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Count lobbies by status and participants across the registry
    pub fn stats(&self) -> Result<RegistryStats> {
        let lobby_types = self.read_types()?.len();
        let lobbies = self.read_lobbies()?.clone();

        let mut stats = RegistryStats {
            lobby_types,
            total_lobbies: lobbies.len(),
            ..RegistryStats::default()
        };
        for lobby in &lobbies {
            let snapshot = lobby.snapshot();
            stats.participants += snapshot.users.len();
            match snapshot.status {
                LobbyStatus::Forming => stats.forming += 1,
                LobbyStatus::Ready => stats.ready += 1,
                LobbyStatus::Closed => stats.closed += 1,
                LobbyStatus::Removable => stats.removable += 1,
            }
        }
        Ok(stats)
    }

    /// Open lobbies of `lobby_type` created at or after position `since`,
    /// together with the registry length at the time of the snapshot
    fn open_lobbies_since(&self, lobby_type: &str, since: usize) -> Result<(Vec<Lobby>, usize)> {
        let snapshot = self.read_lobbies()?.clone();
        let total = snapshot.len();
        let open = snapshot
            .into_iter()
            .skip(since)
            .filter(|lobby| lobby.lobby_type() == lobby_type && !lobby.is_closed())
            .collect();
        Ok((open, total))
    }

    fn read_types(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<LobbyTypeConfig>>>> {
        self.lobby_types
            .read()
            .map_err(|_| lock_error("lobby types"))
    }

    fn write_types(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<LobbyTypeConfig>>>> {
        self.lobby_types
            .write()
            .map_err(|_| lock_error("lobby types"))
    }

    fn read_lobbies(&self) -> Result<RwLockReadGuard<'_, Vec<Lobby>>> {
        self.lobbies.read().map_err(|_| lock_error("lobbies"))
    }

    fn write_lobbies(&self) -> Result<RwLockWriteGuard<'_, Vec<Lobby>>> {
        self.lobbies.write().map_err(|_| lock_error("lobbies"))
    }
}

fn lock_error(what: &str) -> anyhow::Error {
    MatchmakingError::InternalError {
        message: format!("Failed to acquire {} lock", what),
    }
    .into()
}

impl std::fmt::Debug for LobbyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyRegistry")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
