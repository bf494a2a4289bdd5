//! Concurrency stress tests for event dispatch
//!
//! Many tasks feed host events into one dispatcher at once. Afterwards the
//! queue must still hold its invariants: no duplicates, nobody both queued
//! and away, tags matching positions and teams within capacity.

mod fixtures;

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use team_queue::config::QueueConfig;
use team_queue::queue::AdmissionScheduler;
use team_queue::types::{HostEvent, MatchPhase, Team};

use fixtures::{game, spectator, start_system_with, teams, FakeHost};

fn fast_config() -> QueueConfig {
    QueueConfig {
        retry_delay_ms: 5,
        settle_delay_ms: 5,
        vote_settle_delay_ms: 5,
        match_start_delay_ms: 5,
        ..QueueConfig::default()
    }
}

fn assert_queue_invariants(scheduler: &AdmissionScheduler) {
    let queued = scheduler.queued_players().unwrap();
    let afk = scheduler.afk_players().unwrap();

    let unique: HashSet<_> = queued.iter().collect();
    assert_eq!(unique.len(), queued.len(), "duplicate queue entries");

    for player in &afk {
        assert!(!queued.contains(player), "player {} queued and away", player);
    }

    for (index, player) in queued.iter().enumerate() {
        assert_eq!(
            scheduler.tag_of(*player).unwrap(),
            Some(format!("({})", index + 1)),
            "tag of queued player {}",
            player
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_event_storm_keeps_queue_consistent() {
    let mut players = teams(3, 3);
    players.extend((1..=40).map(|id| spectator(id, &format!("spec{}", id))));
    let host = Arc::new(FakeHost::new(Some(game("ca", MatchPhase::InProgress, 4)), players));
    let (scheduler, dispatcher) = start_system_with(host.clone(), fast_config());

    let start_time = Instant::now();
    let mut handles = Vec::new();
    for id in 1..=40u64 {
        let dispatcher = dispatcher.clone();
        let host = host.clone();
        handles.push(tokio::spawn(async move {
            let join = HostEvent::TeamChangeAttempt {
                player: id,
                old_team: Team::Spectator,
                new_team: if id % 2 == 0 { Team::Red } else { Team::Blue },
            };
            let command = |name: &str| HostEvent::Command {
                caller: id,
                name: name.to_string(),
                args: Vec::new(),
            };

            dispatcher.dispatch(&join)?;
            tokio::task::yield_now().await;
            if id % 3 == 0 {
                dispatcher.dispatch(&command("afk"))?;
                tokio::task::yield_now().await;
                dispatcher.dispatch(&command("here"))?;
                dispatcher.dispatch(&join)?;
            }
            dispatcher.dispatch(&command("q"))?;
            if id % 5 == 0 {
                dispatcher.dispatch(&HostEvent::ClientCommand {
                    player: id,
                    command: "team s".to_string(),
                })?;
            }
            if id % 7 == 0 {
                dispatcher.dispatch(&HostEvent::PlayerDisconnected {
                    player: id,
                    reason: None,
                })?;
                host.remove_player(id);
            }
            Ok::<_, anyhow::Error>(())
        }));
    }

    let results = join_all(handles).await;
    for result in results {
        result.expect("task panicked").expect("dispatch failed");
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.flush().await.unwrap();

    let elapsed = start_time.elapsed();
    println!("📊 Event storm settled in {:?}", elapsed);

    assert_queue_invariants(&scheduler);
    assert!(host.count_team(Team::Red) <= 4);
    assert!(host.count_team(Team::Blue) <= 4);

    // Slots were open, so someone got in
    assert!(!host.moves().is_empty());

    let stats = scheduler.stats().unwrap();
    assert!(stats.joins_vetoed >= 40);
    println!(
        "   vetoed {}, admitted {}, passes {} executed / {} coalesced",
        stats.joins_vetoed, stats.players_admitted, stats.passes_executed, stats.passes_coalesced
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_take_or_coalesce() {
    let host = Arc::new(FakeHost::new(
        Some(game("ca", MatchPhase::InProgress, 4)),
        teams(4, 4),
    ));
    let (scheduler, _dispatcher) = start_system_with(host, fast_config());

    let tasks = (0..200).map(|_| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.request_admission(Duration::from_millis(20));
        })
    });
    for result in join_all(tasks).await {
        result.expect("task panicked");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.flush().await.unwrap();

    let stats = scheduler.stats().unwrap();
    assert_eq!(stats.passes_requested + stats.passes_coalesced, 200);
    assert!(stats.passes_requested >= 1);
    assert!(!scheduler.is_push_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_keep_order_unique() {
    let mut players = teams(4, 4);
    players.extend((1..=50).map(|id| spectator(id, &format!("spec{}", id))));
    let host = Arc::new(FakeHost::new(Some(game("ca", MatchPhase::InProgress, 4)), players));
    let (scheduler, _dispatcher) = start_system_with(host, fast_config());

    // Every player asks twice
    let tasks = (1..=50u64).chain(1..=50u64).map(|id| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.enqueue(id, None, "test").map(|_| ()) })
    });
    for result in join_all(tasks).await {
        result.expect("task panicked").expect("enqueue failed");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.flush().await.unwrap();

    assert_eq!(scheduler.queued_players().unwrap().len(), 50);
    assert_eq!(scheduler.stats().unwrap().players_enqueued, 50);
    assert_queue_invariants(&scheduler);
}
