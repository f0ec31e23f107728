//! Lobby lifecycle integration tests
//!
//! Walks lobbies through Forming -> Ready -> Closed -> Removable, driven
//! both manually and by the periodic tasks.

use crate::fixtures::{manual_registry, user, users, EventRecorder, MockClock};
use chrono::{Duration as TimeDelta, TimeZone, Utc};
use lobby_keeper::config::LobbyDefaults;
use lobby_keeper::lobby::{Lobby, LobbyRegistry, LobbyTypeConfig, LobbyTypeOptions};
use lobby_keeper::types::{LobbyStatus, UpdateKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_callback() -> (Arc<AtomicUsize>, impl Fn(&Lobby) + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    (calls, move |_: &Lobby| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_lobby_becomes_ready_then_closes() {
    let (registry, clock) = manual_registry();
    let (closed_calls, on_closed) = counting_callback();
    registry
        .register_type(
            LobbyTypeOptions::new("match", 2, 4)
                .with_ready_timeout(Duration::from_millis(1000))
                .with_closed_callback(on_closed),
        )
        .unwrap();

    let first = user("u1");
    let lobby = registry.join("match", &first).unwrap();
    let recorder = EventRecorder::new();
    recorder.attach(&lobby, &first);
    assert!(!lobby.is_ready());
    assert_eq!(lobby.status(), LobbyStatus::Forming);

    registry.join("match", &user("u2")).unwrap();
    assert!(lobby.is_ready());
    assert_eq!(lobby.time_declared_ready(), Some(lobby_keeper::Clock::now(&clock)));

    clock.advance(Duration::from_millis(1000));
    lobby.run_closure_check();
    assert!(!lobby.is_closed());

    clock.advance(Duration::from_millis(1));
    lobby.run_closure_check();
    assert!(lobby.is_closed());
    assert_eq!(closed_calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(5));
    lobby.run_closure_check();
    assert!(lobby.is_closed());
    assert_eq!(closed_calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        recorder.kinds(),
        vec![
            UpdateKind::UserJoined,
            UpdateKind::LobbyReady,
            UpdateKind::LobbyClosed
        ]
    );
    let closed = recorder.updates().pop().unwrap();
    assert_eq!(closed.lobby().map(|snapshot| snapshot.is_closed), Some(true));
}

#[test]
fn test_timed_out_user_makes_room() {
    let (registry, clock) = manual_registry();
    registry
        .register_type(
            LobbyTypeOptions::new("solo", 1, 1).with_user_timeout(Duration::from_millis(10)),
        )
        .unwrap();

    let lobby = registry.join("solo", &user("u1")).unwrap();
    clock.advance(Duration::from_millis(15));

    let joined = registry.join("solo", &user("u2")).unwrap();

    assert_eq!(joined, lobby);
    assert_eq!(lobby.users(), vec![user("u2")]);
    assert_eq!(registry.get_all(None).unwrap().len(), 1);
}

#[test]
fn test_full_lifecycle_to_archive() {
    let (registry, clock) = manual_registry();
    registry
        .register_type(
            LobbyTypeOptions::new("trio", 3, 3).with_ready_timeout(Duration::from_millis(100)),
        )
        .unwrap();

    let members = users("trio", 3);
    let mut lobby = None;
    for member in &members {
        lobby = Some(registry.join("trio", member).unwrap());
    }
    let lobby = lobby.unwrap();
    let recorder = EventRecorder::new();
    recorder.attach(&lobby, &members[0]);
    assert_eq!(lobby.subscriber_count(), 1);
    recorder.clear();

    // Every other member acknowledges from inside its update callback
    for member in &members[1..] {
        let handle = lobby.clone();
        let me = member.clone();
        lobby.subscribe(member, move |update| {
            if update.kind == UpdateKind::LobbyClosed {
                assert!(handle.acknowledge_lobby_closure(&me));
            }
        });
    }

    clock.advance(Duration::from_millis(101));
    lobby.run_closure_check();
    assert_eq!(lobby.status(), LobbyStatus::Closed);
    assert!(!lobby.leave(&members[0]));
    assert!(!lobby.acknowledge_lobby_closure(&user("stranger")));

    assert!(lobby.acknowledge_lobby_closure(&members[0]));
    assert!(lobby.can_remove());
    assert_eq!(lobby.status(), LobbyStatus::Removable);
    assert_eq!(recorder.count_of(UpdateKind::LobbyReadyToArchive), 1);

    let archived = registry.archive(lobby.id()).unwrap();
    assert_eq!(archived, lobby);
    assert!(registry.get(lobby.id()).is_err());
}

#[test]
fn test_departures_reset_readiness() {
    let (registry, _clock) = manual_registry();
    registry
        .register_type(LobbyTypeOptions::new("match", 2, 4))
        .unwrap();

    let players = users("p", 3);
    let lobby = registry.join("match", &players[0]).unwrap();
    let recorder = EventRecorder::new();
    recorder.attach(&lobby, &players[0]);

    registry.join("match", &players[1]).unwrap();
    registry.join("match", &players[2]).unwrap();
    let ready_at = lobby.time_declared_ready();

    assert!(lobby.leave(&players[2]));
    assert!(lobby.is_ready());
    assert_eq!(lobby.time_declared_ready(), ready_at);

    assert!(lobby.leave(&players[1]));
    assert!(!lobby.is_ready());
    assert_eq!(lobby.time_declared_ready(), None);

    assert_eq!(
        recorder.kinds(),
        vec![
            UpdateKind::UserJoined,
            UpdateKind::LobbyReady,
            UpdateKind::UserJoined,
            UpdateKind::UserLeft,
            UpdateKind::UserLeft,
            UpdateKind::LobbyNotReady
        ]
    );
}

#[tokio::test]
async fn test_periodic_tasks_close_lobby() {
    let registry = LobbyRegistry::new(LobbyDefaults::default());
    let (closed_calls, on_closed) = counting_callback();
    registry
        .register_type(
            LobbyTypeOptions::new("quick", 2, 2)
                .with_user_timeout(Duration::from_secs(10))
                .with_ready_timeout(Duration::from_millis(50))
                .with_check_current_users_interval(Duration::from_millis(10))
                .with_check_closed_status_interval(Duration::from_millis(10))
                .with_closed_callback(on_closed),
        )
        .unwrap();

    let lobby = registry.join("quick", &user("a")).unwrap();
    assert!(lobby.is_heartbeat_sweep_running());
    registry.join("quick", &user("b")).unwrap();
    assert!(lobby.is_closure_check_running());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(lobby.is_closed());
    assert_eq!(closed_calls.load(Ordering::SeqCst), 1);
    assert!(!lobby.is_closure_check_running());
    assert!(!lobby.is_heartbeat_sweep_running());
}

#[tokio::test]
async fn test_periodic_sweep_evicts_silent_users() {
    let registry = LobbyRegistry::new(LobbyDefaults::default());
    registry
        .register_type(
            LobbyTypeOptions::new("quiet", 2, 4)
                .with_user_timeout(Duration::from_millis(30))
                .with_check_current_users_interval(Duration::from_millis(10)),
        )
        .unwrap();

    let silent = user("silent");
    let lobby = registry.join("quiet", &silent).unwrap();
    let recorder = EventRecorder::new();
    recorder.attach(&lobby, &silent);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(lobby.user_count(), 0);
    assert_eq!(recorder.count_of(UpdateKind::UserLeft), 1);
    assert_eq!(recorder.updates()[0].user(), Some(&silent));
}

#[test]
fn test_mocked_clock_stamps_every_transition() {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut clock = MockClock::new();
    clock.expect_now().return_const(t0);

    let config = LobbyTypeConfig::resolve(
        LobbyTypeOptions::new("mocked", 2, 2),
        &LobbyDefaults::default(),
    )
    .unwrap();
    let lobby = Lobby::new("mocked", Arc::new(config), Arc::new(clock));

    lobby.join(&user("a"));
    lobby.join(&user("b"));

    assert_eq!(lobby.time_declared_ready(), Some(t0));
    assert!(lobby
        .participants()
        .iter()
        .all(|participant| participant.join_time() == t0 && participant.last_heartbeat() == t0));
}

#[test]
fn test_mocked_clock_drives_eviction() {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let calls = AtomicUsize::new(0);
    let mut clock = MockClock::new();
    // One call for the join, one for the sweep an hour later
    clock.expect_now().times(2).returning(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as i64;
        t0 + TimeDelta::hours(n)
    });

    let config = LobbyTypeConfig::resolve(
        LobbyTypeOptions::new("mocked", 1, 2),
        &LobbyDefaults::default(),
    )
    .unwrap();
    let lobby = Lobby::new("mocked", Arc::new(config), Arc::new(clock));

    assert!(lobby.join(&user("a")));
    lobby.run_heartbeat_sweep();

    assert_eq!(lobby.user_count(), 0);
    assert!(!lobby.is_ready());
}
