//! Test fixtures: an in-memory game host for integration testing
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use team_queue::config::QueueConfig;
use team_queue::error::{QueueError, Result};
use team_queue::host::{GameHost, PrivilegeCheck, TagStore};
use team_queue::queue::{AdmissionScheduler, EventDispatcher};
use team_queue::types::{ConnectionState, GameInfo, MatchPhase, PlayerId, PlayerInfo, Team};

/// Game host that keeps its roster in memory and records every call.
///
/// Team moves are applied to the roster right away, the way a real server
/// would commit them on the next frame.
#[derive(Debug, Default)]
pub struct FakeHost {
    players: Mutex<Vec<PlayerInfo>>,
    game: Mutex<Option<GameInfo>>,
    max_clients: usize,
    moves: Mutex<Vec<(PlayerId, Team)>>,
    tags: Mutex<HashMap<PlayerId, String>>,
    prints: Mutex<Vec<(PlayerId, String)>>,
    fail_moves: Mutex<bool>,
}

impl FakeHost {
    pub fn new(game: Option<GameInfo>, players: Vec<PlayerInfo>) -> Self {
        Self {
            players: Mutex::new(players),
            game: Mutex::new(game),
            max_clients: 16,
            ..Self::default()
        }
    }

    pub fn set_game(&self, game: Option<GameInfo>) {
        *self.game.lock().unwrap() = game;
    }

    pub fn set_phase(&self, phase: MatchPhase) {
        if let Some(game) = self.game.lock().unwrap().as_mut() {
            game.phase = phase;
        }
    }

    pub fn add_player(&self, player: PlayerInfo) {
        self.players.lock().unwrap().push(player);
    }

    pub fn remove_player(&self, id: PlayerId) {
        self.players.lock().unwrap().retain(|p| p.id != id);
    }

    pub fn set_team(&self, id: PlayerId, team: Team) {
        if let Some(player) = self.players.lock().unwrap().iter_mut().find(|p| p.id == id) {
            player.team = team;
        }
    }

    pub fn set_connection_state(&self, id: PlayerId, state: ConnectionState) {
        if let Some(player) = self.players.lock().unwrap().iter_mut().find(|p| p.id == id) {
            player.connection_state = state;
        }
    }

    pub fn fail_moves(&self, fail: bool) {
        *self.fail_moves.lock().unwrap() = fail;
    }

    pub fn team_of(&self, id: PlayerId) -> Option<Team> {
        self.player(id).map(|p| p.team)
    }

    /// Every team move in the order it was made
    pub fn moves(&self) -> Vec<(PlayerId, Team)> {
        self.moves.lock().unwrap().clone()
    }

    /// Last tag pushed for a player
    pub fn tag(&self, id: PlayerId) -> Option<String> {
        self.tags.lock().unwrap().get(&id).cloned()
    }

    pub fn prints_for(&self, id: PlayerId) -> Vec<String> {
        self.prints
            .lock()
            .unwrap()
            .iter()
            .filter(|(player, _)| *player == id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn count_team(&self, team: Team) -> usize {
        self.team_members(team).len()
    }
}

#[async_trait]
impl GameHost for FakeHost {
    fn players(&self) -> Vec<PlayerInfo> {
        self.players.lock().unwrap().clone()
    }

    fn game(&self) -> Option<GameInfo> {
        self.game.lock().unwrap().clone()
    }

    fn max_clients(&self) -> usize {
        self.max_clients
    }

    async fn move_player(&self, player: PlayerId, team: Team) -> Result<()> {
        if *self.fail_moves.lock().unwrap() {
            return Err(QueueError::HostUnavailable {
                message: "move rejected".to_string(),
            }
            .into());
        }
        self.set_team(player, team);
        self.moves.lock().unwrap().push((player, team));
        Ok(())
    }

    async fn apply_tag(&self, player: PlayerId, tag: &str) -> Result<()> {
        self.tags.lock().unwrap().insert(player, tag.to_string());
        Ok(())
    }

    async fn center_print(&self, player: PlayerId, message: &str) -> Result<()> {
        self.prints
            .lock()
            .unwrap()
            .push((player, message.to_string()));
        Ok(())
    }
}

impl PrivilegeCheck for FakeHost {
    fn has_permission(&self, player: PlayerId, level: u8) -> Result<bool> {
        Ok(self
            .player(player)
            .is_some_and(|p| p.permission.unwrap_or(0) >= level))
    }
}

impl TagStore for FakeHost {
    fn stored_tag(&self, player: PlayerId) -> Result<Option<String>> {
        Ok(self.player(player).and_then(|p| p.stored_tag))
    }
}

pub fn game(gametype: &str, phase: MatchPhase, team_size: usize) -> GameInfo {
    GameInfo {
        gametype: gametype.to_string(),
        phase,
        team_size,
    }
}

pub fn player(id: PlayerId, name: &str, team: Team) -> PlayerInfo {
    PlayerInfo::new(id, name, team, ConnectionState::Active)
}

pub fn spectator(id: PlayerId, name: &str) -> PlayerInfo {
    player(id, name, Team::Spectator)
}

/// `red` players with ids 100.. and `blue` players with ids 200..
pub fn teams(red: usize, blue: usize) -> Vec<PlayerInfo> {
    let red = (0..red as u64).map(|i| player(100 + i, &format!("red{}", i), Team::Red));
    let blue = (0..blue as u64).map(|i| player(200 + i, &format!("blue{}", i), Team::Blue));
    red.chain(blue).collect()
}

/// A started scheduler wired to `host`, and a dispatcher over it
pub fn start_system(host: Arc<FakeHost>) -> (AdmissionScheduler, EventDispatcher) {
    start_system_with(host, QueueConfig::default())
}

pub fn start_system_with(
    host: Arc<FakeHost>,
    config: QueueConfig,
) -> (AdmissionScheduler, EventDispatcher) {
    let scheduler = AdmissionScheduler::new(host.clone(), host.clone(), host, config);
    scheduler.start().expect("frame worker should start");
    let dispatcher = EventDispatcher::new(scheduler.clone());
    (scheduler, dispatcher)
}

/// Let pending passes run out and drain the frame worker
pub async fn settle(scheduler: &AdmissionScheduler) {
    tokio::time::sleep(Duration::from_secs(5)).await;
    scheduler.flush().await.expect("frame worker should be running");
}
