//! Registry matchmaking integration tests

use crate::fixtures::{manual_registry, user, users};
use lobby_keeper::config::LobbyDefaults;
use lobby_keeper::lobby::{IdentifierRule, Lobby, LobbyTypeConfig, LobbyTypeOptions};
use lobby_keeper::types::UserKey;
use lobby_keeper::utils::ManualClock;
use lobby_keeper::MatchmakingError;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_register_type_outcomes() {
    let (registry, _clock) = manual_registry();

    assert!(assert_ok!(registry.register_type(LobbyTypeOptions::new("duel", 2, 2))));
    assert!(!assert_ok!(registry.register_type(LobbyTypeOptions::new("broken", 5, 2))));
    assert_err!(registry.register_type(LobbyTypeOptions::new("", 1, 2)));

    assert_eq!(registry.lobby_types().unwrap(), vec!["duel".to_string()]);
    let err = registry.join("broken", &user("u1")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::LobbyTypeNotFound { .. })
    ));
}

#[test]
fn test_lobby_types_are_isolated() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("a", 2, 4)).unwrap();
    registry.register_type(LobbyTypeOptions::new("b", 2, 4)).unwrap();

    let in_a = registry.join("a", &user("u1")).unwrap();
    let in_b = registry.join("b", &user("u2")).unwrap();

    assert_ne!(in_a, in_b);
    assert_eq!(in_a.lobby_type(), "a");
    assert_eq!(in_b.lobby_type(), "b");
    assert_eq!(registry.get_all(Some(&user("u1"))).unwrap(), vec![in_a]);
    assert_eq!(registry.get_all(None).unwrap().len(), 2);
}

#[test]
fn test_repeated_join_returns_same_lobby() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("squad", 3, 5)).unwrap();

    let first = registry.join("squad", &user("u1")).unwrap();
    let second = registry.join("squad", &user("u1")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.user_count(), 1);
    assert_eq!(registry.get_all(None).unwrap().len(), 1);
}

#[test]
fn test_full_lobbies_spill_into_new_ones() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("pair", 2, 2)).unwrap();

    let players = users("p", 5);
    let lobbies: Vec<Lobby> = players
        .iter()
        .map(|player| registry.join("pair", player).unwrap())
        .collect();

    assert_eq!(lobbies[0], lobbies[1]);
    assert_eq!(lobbies[2], lobbies[3]);
    assert_ne!(lobbies[1], lobbies[2]);
    assert_eq!(registry.get_all(None).unwrap().len(), 3);
    assert!(lobbies[0].is_ready());
    assert!(!lobbies[4].is_ready());
}

#[test]
fn test_first_fit_prefers_oldest_lobby() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("pair", 2, 2)).unwrap();

    let players = users("p", 4);
    let oldest = registry.join("pair", &players[0]).unwrap();
    registry.join("pair", &players[1]).unwrap();
    let newer = registry.join("pair", &players[2]).unwrap();

    assert!(oldest.leave(&players[0]));
    let placed = registry.join("pair", &players[3]).unwrap();

    assert_eq!(placed, oldest);
    assert_eq!(newer.user_count(), 1);
}

#[test]
fn test_closed_lobbies_are_skipped() {
    let (registry, clock) = manual_registry();
    registry
        .register_type(
            LobbyTypeOptions::new("match", 2, 4).with_ready_timeout(Duration::from_millis(10)),
        )
        .unwrap();

    let players = users("p", 3);
    let closed = registry.join("match", &players[0]).unwrap();
    registry.join("match", &players[1]).unwrap();
    clock.advance(Duration::from_millis(11));
    closed.run_closure_check();
    assert!(closed.is_closed());

    let placed = registry.join("match", &players[2]).unwrap();
    assert_ne!(placed, closed);
    assert_eq!(closed.user_count(), 2);
}

#[test]
fn test_evicted_user_rejoins_same_lobby() {
    let (registry, clock) = manual_registry();
    registry
        .register_type(
            LobbyTypeOptions::new("pair", 2, 2).with_user_timeout(Duration::from_millis(10)),
        )
        .unwrap();

    let lobby = registry.join("pair", &user("u1")).unwrap();
    clock.advance(Duration::from_millis(15));
    lobby.run_heartbeat_sweep();
    assert_eq!(lobby.user_count(), 0);

    let again = registry.join("pair", &user("u1")).unwrap();
    assert_eq!(again, lobby);
    assert_eq!(lobby.user_count(), 1);
}

#[test]
fn test_numeric_and_string_ids_are_one_user() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("squad", 3, 5)).unwrap();

    let lobby = registry.join("squad", &json!({ "id": 7 })).unwrap();
    let same = registry.join("squad", &json!({ "id": "7" })).unwrap();

    assert_eq!(lobby, same);
    assert_eq!(lobby.user_count(), 1);
}

#[test]
fn test_identifier_field_per_type() {
    let (registry, _clock) = manual_registry();
    registry
        .register_type(LobbyTypeOptions::new("squad", 3, 5).with_identifier_field("userId"))
        .unwrap();

    let lobby = registry
        .join("squad", &json!({ "userId": "alice", "id": 1 }))
        .unwrap();

    assert!(lobby.has_user(&json!({ "userId": "alice", "id": 2 })));
    assert!(!lobby.has_user(&json!({ "userId": "bob", "id": 1 })));
}

#[test]
fn test_custom_identifier_rule() {
    let (registry, _clock) = manual_registry();
    let by_email = IdentifierRule::custom(|user| {
        user["email"]
            .as_str()
            .map(|email| UserKey::new(email.to_lowercase()))
    });
    registry
        .register_type(LobbyTypeOptions::new("squad", 3, 5).with_identifier(by_email))
        .unwrap();

    let lobby = registry
        .join("squad", &json!({ "email": "Alice@Example.com" }))
        .unwrap();
    let same = registry
        .join("squad", &json!({ "email": "alice@example.com" }))
        .unwrap();

    assert_eq!(lobby, same);
    assert_eq!(lobby.user_count(), 1);
}

#[test]
fn test_user_without_identity_is_rejected() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("squad", 3, 5)).unwrap();

    let err = registry
        .join("squad", &json!({ "name": "nobody" }))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::InvalidUser { .. })
    ));
    assert!(registry.get_all(None).unwrap().is_empty());
}

#[test]
fn test_archive_requires_removable_lobby() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("pair", 2, 2)).unwrap();
    let lobby = registry.join("pair", &user("u1")).unwrap();

    let err = registry.archive(lobby.id()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::LobbyNotRemovable { .. })
    ));
    assert_eq!(assert_ok!(registry.get(lobby.id())), lobby);

    let unknown = uuid::Uuid::new_v4();
    assert_err!(registry.get(unknown));
    assert_err!(registry.archive(unknown));
}

#[test]
fn test_stats_track_lobby_states() {
    let (registry, _clock) = manual_registry();
    registry.register_type(LobbyTypeOptions::new("pair", 2, 2)).unwrap();
    registry.register_type(LobbyTypeOptions::new("squad", 3, 5)).unwrap();

    for player in users("p", 3) {
        registry.join("pair", &player).unwrap();
    }
    registry.join("squad", &user("solo")).unwrap();

    let stats = registry.stats().unwrap();
    assert_eq!(stats.lobby_types, 2);
    assert_eq!(stats.total_lobbies, 3);
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.forming, 2);
    assert_eq!(stats.participants, 4);
}

proptest! {
    #[test]
    fn prop_readiness_tracks_member_count(
        min_users in 1usize..4,
        extra in 0usize..4,
        ops in prop::collection::vec((any::<bool>(), 0u8..8), 1..40),
    ) {
        let max_users = min_users + extra;
        let config = LobbyTypeConfig::resolve(
            LobbyTypeOptions::new("prop", min_users, max_users),
            &LobbyDefaults::default(),
        )
        .unwrap();
        let lobby = Lobby::new("prop", Arc::new(config), Arc::new(ManualClock::default()));

        for (joining, id) in ops {
            let member = user(&id.to_string());
            if joining {
                lobby.join(&member);
            } else {
                lobby.leave(&member);
            }

            let count = lobby.user_count();
            prop_assert!(count <= max_users);
            prop_assert_eq!(lobby.is_ready(), count >= min_users);
            prop_assert_eq!(lobby.time_declared_ready().is_some(), lobby.is_ready());
        }
    }

    #[test]
    fn prop_joins_fill_lobbies_in_order(count in 1usize..40, max_users in 1usize..6) {
        let (registry, _clock) = manual_registry();
        registry
            .register_type(LobbyTypeOptions::new("prop", 1, max_users))
            .unwrap();

        for player in users("p", count) {
            registry.join("prop", &player).unwrap();
        }

        let lobbies = registry.get_all(None).unwrap();
        prop_assert_eq!(lobbies.len(), count.div_ceil(max_users));
        let (last, full) = lobbies.split_last().unwrap();
        prop_assert!(full.iter().all(|lobby| lobby.user_count() == max_users));
        prop_assert!(last.user_count() >= 1);
    }
}
