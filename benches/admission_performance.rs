//! Performance benchmarks for admission planning and queue handling

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::sync::Arc;
use team_queue::config::QueueConfig;
use team_queue::host::{DenyAll, GameHost, NoStoredTags};
use team_queue::queue::scheduler::{plan_placement, pull_from_queue, pull_pair};
use team_queue::queue::{AdmissionScheduler, TeamCounts, TeamLocks, Waitlist};
use team_queue::types::{ConnectionState, GameInfo, MatchPhase, PlayerId, PlayerInfo, Team};

// Host with a fixed roster for benchmarks
struct BenchHost {
    players: Vec<PlayerInfo>,
    game: GameInfo,
}

#[async_trait::async_trait]
impl GameHost for BenchHost {
    fn players(&self) -> Vec<PlayerInfo> {
        self.players.clone()
    }

    fn game(&self) -> Option<GameInfo> {
        Some(self.game.clone())
    }

    fn max_clients(&self) -> usize {
        64
    }

    async fn move_player(&self, _player: PlayerId, _team: Team) -> team_queue::Result<()> {
        Ok(())
    }

    async fn apply_tag(&self, _player: PlayerId, _tag: &str) -> team_queue::Result<()> {
        Ok(())
    }

    async fn center_print(&self, _player: PlayerId, _message: &str) -> team_queue::Result<()> {
        Ok(())
    }
}

fn ca(phase: MatchPhase) -> GameInfo {
    GameInfo {
        gametype: "ca".to_string(),
        phase,
        team_size: 8,
    }
}

fn spectators(count: u64) -> Vec<PlayerInfo> {
    (0..count)
        .map(|id| {
            PlayerInfo::new(
                id,
                format!("spec{}", id),
                Team::Spectator,
                ConnectionState::Active,
            )
        })
        .collect()
}

fn bench_plan_placement(c: &mut Criterion) {
    let game = ca(MatchPhase::InProgress);
    let counts = TeamCounts {
        red: 5,
        blue: 7,
        free: 0,
        spectators: 20,
    };

    c.bench_function("plan_placement", |b| {
        b.iter(|| {
            black_box(plan_placement(
                black_box(&game),
                black_box(counts),
                16,
                20,
                TeamLocks::default(),
            ))
        })
    });
}

fn bench_pull_from_queue(c: &mut Criterion) {
    let roster: HashMap<PlayerId, PlayerInfo> =
        spectators(64).into_iter().map(|p| (p.id, p)).collect();

    c.bench_function("pull_from_queue_64", |b| {
        b.iter(|| {
            let mut waitlist = Waitlist::new();
            for id in 0..64 {
                waitlist.enqueue(id, None);
            }
            black_box(pull_from_queue(&mut waitlist, &roster, 8, Team::Red))
        })
    });

    c.bench_function("pull_pair_64", |b| {
        b.iter(|| {
            let mut waitlist = Waitlist::new();
            for id in 0..64 {
                waitlist.enqueue(id, None);
            }
            black_box(pull_pair(&mut waitlist, &roster))
        })
    });
}

fn bench_waitlist(c: &mut Criterion) {
    c.bench_function("waitlist_churn_256", |b| {
        b.iter(|| {
            let mut waitlist = Waitlist::new();
            for id in 0..256 {
                waitlist.enqueue(id, None);
            }
            for id in (0..256).step_by(3) {
                waitlist.mark_afk(id);
            }
            for id in (0..256).step_by(5) {
                waitlist.remove(id);
            }
            black_box(waitlist.position_of(255))
        })
    });
}

fn bench_enqueue_and_retag(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("enqueue_32_with_retag", |b| {
        b.iter(|| {
            rt.block_on(async {
                let host = Arc::new(BenchHost {
                    players: spectators(32),
                    // Passes are skipped before the game starts
                    game: ca(MatchPhase::PreGame),
                });
                let scheduler = AdmissionScheduler::new(
                    host,
                    Arc::new(DenyAll),
                    Arc::new(NoStoredTags),
                    QueueConfig::default(),
                );
                scheduler.start().unwrap();
                for id in 0..32 {
                    let _ = scheduler.enqueue(id, Some(0), "bench");
                }
                scheduler.flush().await.unwrap();
                black_box(scheduler.stats().unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_plan_placement,
    bench_pull_from_queue,
    bench_waitlist,
    bench_enqueue_and_retag
);
criterion_main!(benches);
