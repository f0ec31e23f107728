//! Concurrent join load tests
//!
//! Many tasks join the same registry at once on a multi-threaded runtime.
//! Every user must end up in exactly one lobby and no lobby may overflow.

use crate::fixtures::{user, users};
use futures::future::join_all;
use lobby_keeper::config::LobbyDefaults;
use lobby_keeper::lobby::{LobbyRegistry, LobbyTypeOptions};
use lobby_keeper::types::UserRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn registry_with(types: &[(&str, usize, usize)]) -> Arc<LobbyRegistry> {
    let registry = LobbyRegistry::new(LobbyDefaults::default());
    for &(name, min_users, max_users) in types {
        registry
            .register_type(
                LobbyTypeOptions::new(name, min_users, max_users)
                    .with_user_timeout(Duration::from_secs(60))
                    .with_ready_timeout(Duration::from_secs(60)),
            )
            .unwrap();
    }
    Arc::new(registry)
}

async fn join_concurrently(
    registry: &Arc<LobbyRegistry>,
    assignments: Vec<(String, UserRecord)>,
) -> Vec<lobby_keeper::Lobby> {
    let tasks = assignments.into_iter().map(|(lobby_type, player)| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.join(&lobby_type, &player) })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.expect("join task panicked").expect("join failed"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_joins_single_type() {
    let registry = registry_with(&[("squad", 2, 4)]);
    let players = users("load", 200);

    let start = Instant::now();
    let placed = join_concurrently(
        &registry,
        players
            .iter()
            .map(|player| ("squad".to_string(), player.clone()))
            .collect(),
    )
    .await;
    println!("Placed {} users in {:?}", placed.len(), start.elapsed());

    let lobbies = registry.get_all(None).unwrap();
    assert_eq!(lobbies.len(), 50);
    assert!(lobbies.iter().all(|lobby| lobby.user_count() == 4));

    for (player, lobby) in players.iter().zip(&placed) {
        let holding = registry.get_all(Some(player)).unwrap();
        assert_eq!(holding, vec![lobby.clone()]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_joins_across_types() {
    let registry = registry_with(&[("duel", 2, 2), ("trio", 3, 3), ("squad", 3, 5)]);
    let types = ["duel", "trio", "squad"];

    let assignments: Vec<(String, UserRecord)> = (0..300)
        .map(|i| {
            (
                types[i % types.len()].to_string(),
                user(&format!("mixed-{}", i)),
            )
        })
        .collect();
    join_concurrently(&registry, assignments).await;

    let mut per_type: HashMap<String, Vec<usize>> = HashMap::new();
    for lobby in registry.get_all(None).unwrap() {
        per_type
            .entry(lobby.lobby_type().to_string())
            .or_default()
            .push(lobby.user_count());
    }

    for (name, max_users) in [("duel", 2usize), ("trio", 3), ("squad", 5)] {
        let counts = &per_type[name];
        assert_eq!(counts.len(), 100usize.div_ceil(max_users), "type {}", name);
        assert!(counts.iter().all(|&count| count <= max_users));
        assert_eq!(counts.iter().sum::<usize>(), 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejoins_are_idempotent() {
    let registry = registry_with(&[("squad", 2, 4)]);
    let players = users("repeat", 20);

    // Every user joins five times at once
    let assignments: Vec<(String, UserRecord)> = players
        .iter()
        .flat_map(|player| std::iter::repeat(("squad".to_string(), player.clone())).take(5))
        .collect();
    join_concurrently(&registry, assignments).await;

    let lobbies = registry.get_all(None).unwrap();
    let total: usize = lobbies.iter().map(|lobby| lobby.user_count()).sum();
    assert_eq!(total, players.len());
    for player in &players {
        assert_eq!(registry.get_all(Some(player)).unwrap().len(), 1);
    }
}
