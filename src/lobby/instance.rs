//! Lobby instance implementation and lifecycle management
//!
//! A lobby moves Forming -> Ready -> Closed -> Removable. Forming and Ready
//! oscillate as users come and go; closing is permanent. Two periodic tasks
//! drive the time-based transitions: the heartbeat sweep evicts silent users
//! and the closure check closes a lobby that has stayed ready past its grace
//! period.
//!
//! All state lives behind one mutex per lobby, shared by the public
//! operations and both periodic tasks. Updates and the closed callback are
//! dispatched only after that mutex is released.

use crate::lobby::participant::Participant;
use crate::lobby::provider::LobbyTypeConfig;
use crate::lobby::timer::TimerService;
use crate::lobby::updates::{UpdateCallback, UpdateChannel};
use crate::metrics::MetricsCollector;
use crate::types::{
    LeaveReason, LobbyId, LobbySnapshot, LobbyStatus, LobbyUpdate, UpdateKind, UpdatePayload,
    UserKey, UserRecord,
};
use crate::utils::{generate_lobby_id, Clock};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

/// Mutable lobby state, guarded by the lobby mutex
#[derive(Debug, Default)]
struct LobbyState {
    participants: Vec<Participant>,
    is_ready: bool,
    time_declared_ready: Option<DateTime<Utc>>,
    is_closed: bool,
    time_closed: Option<DateTime<Utc>>,
    can_remove: bool,
}

impl LobbyState {
    fn position(&self, key: &UserKey) -> Option<usize> {
        self.participants.iter().position(|p| p.key() == key)
    }

    fn find_mut(&mut self, key: &UserKey) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.key() == key)
    }

    fn status(&self) -> LobbyStatus {
        match (self.is_ready, self.is_closed, self.can_remove) {
            (_, _, true) => LobbyStatus::Removable,
            (_, true, false) => LobbyStatus::Closed,
            (true, false, false) => LobbyStatus::Ready,
            (false, false, false) => LobbyStatus::Forming,
        }
    }
}

/// Side effects collected under the lock and dispatched after it is released
#[derive(Default)]
struct Outbox {
    updates: Vec<LobbyUpdate>,
    closed: bool,
}

struct LobbyShared {
    id: LobbyId,
    lobby_type: String,
    config: Arc<LobbyTypeConfig>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsCollector>>,
    state: Mutex<LobbyState>,
    updates: UpdateChannel,
    check_current_users_timer: TimerService,
    check_closed_status_timer: TimerService,
}

/// Handle to a live lobby. Clones refer to the same lobby.
#[derive(Clone)]
pub struct Lobby {
    shared: Arc<LobbyShared>,
}

impl Lobby {
    /// Create an empty lobby and start its heartbeat sweep.
    ///
    /// The sweep runs once immediately and then every
    /// `check_current_users_interval`. Outside a tokio runtime no periodic
    /// task runs and the lobby must be driven through `run_heartbeat_sweep`
    /// and `run_closure_check`.
    pub fn new(
        lobby_type: impl Into<String>,
        config: Arc<LobbyTypeConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(lobby_type.into(), config, clock, None)
    }

    /// Create an empty lobby that reports to `metrics`
    pub fn with_metrics(
        lobby_type: impl Into<String>,
        config: Arc<LobbyTypeConfig>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::build(lobby_type.into(), config, clock, Some(metrics))
    }

    /// Create a lobby and join each of `users` in order
    pub fn with_users(
        lobby_type: impl Into<String>,
        config: Arc<LobbyTypeConfig>,
        clock: Arc<dyn Clock>,
        users: &[UserRecord],
    ) -> Self {
        let lobby = Self::new(lobby_type, config, clock);
        for user in users {
            lobby.join(user);
        }
        lobby
    }

    fn build(
        lobby_type: String,
        config: Arc<LobbyTypeConfig>,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<LobbyShared>| {
            let sweep_target = weak.clone();
            let closure_target = weak.clone();
            LobbyShared {
                id: generate_lobby_id(),
                check_current_users_timer: TimerService::new(
                    "check_current_users",
                    config.check_current_users_interval,
                    true,
                    move || {
                        if let Some(shared) = sweep_target.upgrade() {
                            Lobby { shared }.run_heartbeat_sweep();
                        }
                    },
                ),
                check_closed_status_timer: TimerService::new(
                    "check_closed_status",
                    config.check_closed_status_interval,
                    false,
                    move || {
                        if let Some(shared) = closure_target.upgrade() {
                            Lobby { shared }.run_closure_check();
                        }
                    },
                ),
                lobby_type,
                config,
                clock,
                metrics,
                state: Mutex::new(LobbyState::default()),
                updates: UpdateChannel::new(),
            }
        });

        let lobby = Self { shared };
        lobby.shared.check_current_users_timer.start();
        debug!(
            "Created lobby {} - type: {}, users: {}..={}",
            lobby.id(),
            lobby.lobby_type(),
            lobby.config().min_users,
            lobby.config().max_users
        );
        lobby
    }

    /// Subscribe `user` to updates from this lobby, replacing any callback
    /// the same identity registered before. Returns false if the user has no
    /// identity.
    pub fn subscribe<F>(&self, user: &UserRecord, callback: F) -> bool
    where
        F: Fn(&LobbyUpdate) + Send + Sync + 'static,
    {
        match self.key_of(user) {
            Some(key) => {
                let callback: UpdateCallback = Arc::new(callback);
                self.shared.updates.subscribe(key, callback);
                true
            }
            None => false,
        }
    }

    /// Remove `user`'s update callback. Returns true if one was registered.
    pub fn unsubscribe(&self, user: &UserRecord) -> bool {
        self.key_of(user)
            .is_some_and(|key| self.shared.updates.unsubscribe(&key))
    }

    /// Join the lobby.
    ///
    /// A user who is already a member only has their heartbeat refreshed.
    /// Otherwise expired members are evicted first, and the join fails if
    /// the lobby is closed or full. Returns whether the user is now a member.
    pub fn join(&self, user: &UserRecord) -> bool {
        let Some(key) = self.key_of(user) else {
            return false;
        };

        let mut outbox = Outbox::default();
        let joined = {
            let mut state = self.lock();
            let now = self.shared.clock.now();

            if let Some(participant) = state.find_mut(&key) {
                participant.check_in(now);
                debug!("User '{}' re-joined lobby {}", key, self.id());
                true
            } else {
                self.evict_expired(&mut state, &mut outbox, now);

                if state.is_closed {
                    debug!("User '{}' rejected from closed lobby {}", key, self.id());
                    self.record_join_rejected("closed");
                    false
                } else if state.participants.len() >= self.shared.config.max_users {
                    debug!("User '{}' rejected from full lobby {}", key, self.id());
                    self.record_join_rejected("full");
                    false
                } else {
                    state
                        .participants
                        .push(Participant::new(user.clone(), key.clone(), now));
                    info!(
                        "User '{}' joined lobby {} ({}/{})",
                        key,
                        self.id(),
                        state.participants.len(),
                        self.shared.config.max_users
                    );
                    if let Some(metrics) = &self.shared.metrics {
                        metrics.record_user_joined(&self.shared.lobby_type);
                    }
                    outbox.updates.push(self.user_update(
                        UpdateKind::UserJoined,
                        user.clone(),
                        now,
                    ));
                    if !state.is_ready {
                        self.check_ready_status(&mut state, &mut outbox, now);
                    }
                    true
                }
            }
        };

        self.dispatch(outbox);
        joined
    }

    /// Leave the lobby. Fails if the user is absent or the lobby is closed.
    pub fn leave(&self, user: &UserRecord) -> bool {
        let Some(key) = self.key_of(user) else {
            return false;
        };

        let mut outbox = Outbox::default();
        let left = {
            let mut state = self.lock();
            match state.position(&key) {
                Some(_) if state.is_closed => false,
                Some(index) => {
                    let now = self.shared.clock.now();
                    self.remove_participant(&mut state, &mut outbox, index, LeaveReason::Left, now);
                    true
                }
                None => false,
            }
        };

        self.dispatch(outbox);
        left
    }

    /// Refresh a member's heartbeat. Returns whether the user is a member.
    pub fn check_in(&self, user: &UserRecord) -> bool {
        let Some(key) = self.key_of(user) else {
            return false;
        };

        let mut state = self.lock();
        let now = self.shared.clock.now();
        match state.find_mut(&key) {
            Some(participant) => {
                participant.check_in(now);
                true
            }
            None => false,
        }
    }

    /// Record that a member has seen the lobby close.
    ///
    /// Fails unless the lobby is closed and the user is a member. Once every
    /// member has acknowledged, the lobby becomes removable.
    pub fn acknowledge_lobby_closure(&self, user: &UserRecord) -> bool {
        let Some(key) = self.key_of(user) else {
            return false;
        };

        let mut outbox = Outbox::default();
        let acknowledged = {
            let mut state = self.lock();
            if !state.is_closed {
                false
            } else if let Some(participant) = state.find_mut(&key) {
                participant.acknowledge_lobby_closure();
                debug!("User '{}' acknowledged closure of lobby {}", key, self.id());
                let now = self.shared.clock.now();
                self.check_can_remove_status(&mut state, &mut outbox, now);
                true
            } else {
                false
            }
        };

        self.dispatch(outbox);
        acknowledged
    }

    /// Whether `user` is a member of this lobby
    pub fn has_user(&self, user: &UserRecord) -> bool {
        self.key_of(user)
            .is_some_and(|key| self.lock().position(&key).is_some())
    }

    /// Evict every member whose heartbeat has expired.
    ///
    /// This is the body of the periodic heartbeat sweep.
    pub fn run_heartbeat_sweep(&self) {
        let mut outbox = Outbox::default();
        {
            let mut state = self.lock();
            let now = self.shared.clock.now();
            self.evict_expired(&mut state, &mut outbox, now);
        }
        self.dispatch(outbox);
    }

    /// Close the lobby if it has been ready for longer than the grace period.
    ///
    /// This is the body of the periodic closure check. Closing stops both
    /// periodic tasks, publishes `LobbyClosed` and then invokes the type's
    /// closed callback.
    pub fn run_closure_check(&self) {
        let mut outbox = Outbox::default();
        {
            let mut state = self.lock();
            let now = self.shared.clock.now();
            let grace_elapsed = state
                .time_declared_ready
                .and_then(|ready_at| ready_at.checked_add_signed(self.shared.config.ready_timeout))
                .is_some_and(|deadline| now > deadline);

            if state.is_ready && !state.is_closed && grace_elapsed {
                state.is_closed = true;
                state.time_closed = Some(now);
                self.shared.check_current_users_timer.stop();
                self.shared.check_closed_status_timer.stop();

                info!(
                    "Lobby {} closed with {} users",
                    self.id(),
                    state.participants.len()
                );
                if let Some(metrics) = &self.shared.metrics {
                    let ready_for = state
                        .time_declared_ready
                        .map(|ready_at| (now - ready_at).to_std().unwrap_or_default())
                        .unwrap_or_default();
                    metrics.record_lobby_closed(&self.shared.lobby_type, ready_for);
                }

                outbox
                    .updates
                    .push(self.lobby_update(UpdateKind::LobbyClosed, &state, now));
                outbox.closed = true;
            }
        }
        self.dispatch(outbox);
    }

    pub fn id(&self) -> LobbyId {
        self.shared.id
    }

    pub fn lobby_type(&self) -> &str {
        &self.shared.lobby_type
    }

    pub fn config(&self) -> &LobbyTypeConfig {
        &self.shared.config
    }

    /// Member user records in join order
    pub fn users(&self) -> Vec<UserRecord> {
        self.lock()
            .participants
            .iter()
            .map(|p| p.user().clone())
            .collect()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.lock().participants.clone()
    }

    pub fn user_count(&self) -> usize {
        self.lock().participants.len()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_ready
    }

    pub fn time_declared_ready(&self) -> Option<DateTime<Utc>> {
        self.lock().time_declared_ready
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed
    }

    pub fn time_closed(&self) -> Option<DateTime<Utc>> {
        self.lock().time_closed
    }

    pub fn can_remove(&self) -> bool {
        self.lock().can_remove
    }

    pub fn status(&self) -> LobbyStatus {
        self.lock().status()
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        self.snapshot_of(&self.lock())
    }

    pub fn is_heartbeat_sweep_running(&self) -> bool {
        self.shared.check_current_users_timer.is_running()
    }

    pub fn is_closure_check_running(&self) -> bool {
        self.shared.check_closed_status_timer.is_running()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.updates.subscriber_count()
    }

    fn key_of(&self, user: &UserRecord) -> Option<UserKey> {
        self.shared.config.user_key(user)
    }

    fn lock(&self) -> MutexGuard<'_, LobbyState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove expired members. Closed lobbies keep every member.
    fn evict_expired(&self, state: &mut LobbyState, outbox: &mut Outbox, now: DateTime<Utc>) {
        if state.is_closed {
            return;
        }

        let timeout = self.shared.config.user_timeout;
        while let Some(index) = state
            .participants
            .iter()
            .position(|p| p.is_expired(now, timeout))
        {
            self.remove_participant(state, outbox, index, LeaveReason::Timeout, now);
        }
    }

    fn remove_participant(
        &self,
        state: &mut LobbyState,
        outbox: &mut Outbox,
        index: usize,
        reason: LeaveReason,
        now: DateTime<Utc>,
    ) {
        let participant = state.participants.remove(index);
        info!(
            "User '{}' left lobby {} ({}) - {} remaining",
            participant.key(),
            self.id(),
            reason.as_str(),
            state.participants.len()
        );
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_user_left(&self.shared.lobby_type, reason);
        }

        outbox.updates.push(self.user_update(
            UpdateKind::UserLeft,
            participant.user().clone(),
            now,
        ));
        if state.is_ready {
            self.check_ready_status(state, outbox, now);
        }
    }

    /// Recompute readiness from the member count, acting only on edges
    fn check_ready_status(&self, state: &mut LobbyState, outbox: &mut Outbox, now: DateTime<Utc>) {
        let was_ready = state.is_ready;
        if self.shared.config.is_within_bounds(state.participants.len()) {
            state.is_ready = true;
            state.time_declared_ready.get_or_insert(now);
        } else {
            state.is_ready = false;
            state.time_declared_ready = None;
        }

        if was_ready == state.is_ready {
            return;
        }

        if let Some(metrics) = &self.shared.metrics {
            metrics.record_readiness_change(&self.shared.lobby_type, state.is_ready);
        }

        if state.is_ready {
            self.shared.check_closed_status_timer.start();
            info!(
                "Lobby {} is ready with {} users",
                self.id(),
                state.participants.len()
            );
            outbox
                .updates
                .push(self.lobby_update(UpdateKind::LobbyReady, state, now));
        } else {
            self.shared.check_closed_status_timer.stop();
            info!(
                "Lobby {} is no longer ready ({} users)",
                self.id(),
                state.participants.len()
            );
            outbox
                .updates
                .push(self.lobby_update(UpdateKind::LobbyNotReady, state, now));
        }
    }

    fn check_can_remove_status(
        &self,
        state: &mut LobbyState,
        outbox: &mut Outbox,
        now: DateTime<Utc>,
    ) {
        if !state.is_ready || !state.is_closed || state.can_remove {
            return;
        }

        if state
            .participants
            .iter()
            .all(Participant::has_acknowledged_closure)
        {
            state.can_remove = true;
            info!("Lobby {} is ready to be archived", self.id());
            if let Some(metrics) = &self.shared.metrics {
                metrics.record_lobby_removable(&self.shared.lobby_type);
            }
            outbox
                .updates
                .push(self.lobby_update(UpdateKind::LobbyReadyToArchive, state, now));
        }
    }

    fn user_update(&self, kind: UpdateKind, user: UserRecord, now: DateTime<Utc>) -> LobbyUpdate {
        LobbyUpdate {
            lobby_id: self.id(),
            kind,
            payload: UpdatePayload::User(user),
            timestamp: now,
        }
    }

    fn lobby_update(&self, kind: UpdateKind, state: &LobbyState, now: DateTime<Utc>) -> LobbyUpdate {
        LobbyUpdate {
            lobby_id: self.id(),
            kind,
            payload: UpdatePayload::Lobby(self.snapshot_of(state)),
            timestamp: now,
        }
    }

    fn snapshot_of(&self, state: &LobbyState) -> LobbySnapshot {
        LobbySnapshot {
            id: self.id(),
            lobby_type: self.shared.lobby_type.clone(),
            users: state.participants.iter().map(|p| p.user().clone()).collect(),
            status: state.status(),
            is_ready: state.is_ready,
            time_declared_ready: state.time_declared_ready,
            is_closed: state.is_closed,
            time_closed: state.time_closed,
            can_remove: state.can_remove,
        }
    }

    fn record_join_rejected(&self, reason: &str) {
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_join_rejected(&self.shared.lobby_type, reason);
        }
    }

    /// Deliver collected updates, then the closed callback. Must be called
    /// without the state lock held.
    fn dispatch(&self, outbox: Outbox) {
        for update in &outbox.updates {
            self.shared.updates.publish(update);
        }
        if outbox.closed {
            (self.shared.config.closed_callback)(self);
        }
    }
}

impl PartialEq for Lobby {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Lobby {}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Lobby")
            .field("id", &self.shared.id)
            .field("lobby_type", &self.shared.lobby_type)
            .field("users", &state.participants.len())
            .field("status", &state.status())
            .finish()
    }
}
