//! Admission scheduler
//!
//! The scheduler owns the waiting list, the tag table, the team locks and
//! the end-screen flag. Host event handlers are synchronous: they mutate
//! that state under one mutex and hand work to a single frame worker,
//! which performs every host call and every placement check in order.
//!
//! Admission passes are debounced by a single pending flag. A request made
//! while another pass is pending is dropped; every event that can open a
//! slot requests its own pass, so a dropped request only defers work.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::host::provider::{GameHost, PrivilegeCheck, TagStore};
use crate::metrics::MetricsCollector;
use crate::queue::locks::{parse_lock_announcement, TeamLocks};
use crate::queue::tags::{compute_tag, render_tag, rewrite_name_keys, TagContext, TagTable};
use crate::queue::waitlist::{EnqueueOutcome, Waitlist};
use crate::types::{
    AdmissionStats, GameInfo, GametypeClass, MatchPhase, PlayerId, PlayerInfo, Team, Verdict,
};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Work handed to the frame worker
#[derive(Debug)]
pub enum FrameTask {
    /// Run one placement check
    CheckForPlace,
    Move { player: PlayerId, team: Team },
    /// Push the player's current tag to the host
    ApplyTag(PlayerId),
    CenterPrint { player: PlayerId, message: String },
    /// Completes once every earlier task has run
    Barrier(oneshot::Sender<()>),
}

/// Mutable queue state guarded by one lock
#[derive(Debug, Default)]
struct QueueState {
    waitlist: Waitlist,
    tags: TagTable,
    locks: TeamLocks,
    end_screen: bool,
}

/// Team sizes from one roster read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamCounts {
    pub red: usize,
    pub blue: usize,
    pub free: usize,
    pub spectators: usize,
}

impl TeamCounts {
    pub fn of(players: &[PlayerInfo]) -> Self {
        players
            .iter()
            .fold(TeamCounts::default(), |mut counts, player| {
                match player.team {
                    Team::Red => counts.red += 1,
                    Team::Blue => counts.blue += 1,
                    Team::Free => counts.free += 1,
                    Team::Spectator => counts.spectators += 1,
                }
                counts
            })
    }
}

/// What a placement check decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Nothing,
    /// Pull up to `amount` players into one team
    Team { amount: usize, team: Team },
    /// Queue head to red, second to blue
    Both,
}

/// Players moved out of the queue by one placement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullResult {
    pub admitted: Vec<(PlayerId, Team)>,
    pub dropped: Vec<PlayerId>,
}

impl PullResult {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty() && self.dropped.is_empty()
    }

    fn remove_from(&self, waitlist: &mut Waitlist) {
        for (player, _) in &self.admitted {
            waitlist.remove(*player);
        }
        for player in &self.dropped {
            waitlist.remove(*player);
        }
    }
}

/// Active player cap for the current game.
///
/// Team size counts per team in team-based games. A team size of zero
/// falls back to the server's client cap.
pub fn max_players(game: &GameInfo, max_clients: usize) -> usize {
    let mut max = game.team_size;
    if game.class() == GametypeClass::TeamBased {
        max *= 2;
    }
    if max == 0 {
        max = max_clients;
    }
    max
}

/// Decide how to fill open slots
pub fn plan_placement(
    game: &GameInfo,
    counts: TeamCounts,
    max_players: usize,
    queued: usize,
    locks: TeamLocks,
) -> Placement {
    match game.class() {
        GametypeClass::TeamBased => {
            if counts.red > counts.blue && !locks.blue {
                Placement::Team {
                    amount: counts.red - counts.blue,
                    team: Team::Blue,
                }
            } else if counts.blue > counts.red && !locks.red {
                Placement::Team {
                    amount: counts.blue - counts.red,
                    team: Team::Red,
                }
            } else if counts.red + counts.blue < max_players {
                if queued > 1 && !locks.any_locked() {
                    Placement::Both
                } else if game.phase == MatchPhase::Warmup {
                    // A lone queued player only goes in during warmup
                    if !locks.red && counts.red < game.team_size {
                        Placement::Team {
                            amount: 1,
                            team: Team::Red,
                        }
                    } else if !locks.blue && counts.blue < game.team_size {
                        Placement::Team {
                            amount: 1,
                            team: Team::Blue,
                        }
                    } else {
                        Placement::Nothing
                    }
                } else {
                    Placement::Nothing
                }
            } else {
                Placement::Nothing
            }
        }
        GametypeClass::Solo if counts.free < max_players => Placement::Team {
            amount: max_players - counts.free,
            team: Team::Free,
        },
        _ => Placement::Nothing,
    }
}

fn is_admittable(roster: &HashMap<PlayerId, PlayerInfo>, player: PlayerId) -> bool {
    roster
        .get(&player)
        .is_some_and(|info| info.team.is_spectator() && info.connection_state.is_active())
}

fn is_loading(roster: &HashMap<PlayerId, PlayerInfo>, player: PlayerId) -> bool {
    roster
        .get(&player)
        .is_some_and(|info| info.connection_state.is_loading())
}

/// Take up to `amount` admittable players from the front of the queue.
///
/// A loading player keeps its position and is skipped, so players behind
/// it can still be admitted. Anyone else who cannot be admitted is dropped.
pub fn pull_from_queue(
    waitlist: &mut Waitlist,
    roster: &HashMap<PlayerId, PlayerInfo>,
    amount: usize,
    team: Team,
) -> PullResult {
    let (admitted, dropped) = scan_queue(waitlist, roster, amount);
    let result = PullResult {
        admitted: admitted.into_iter().map(|player| (player, team)).collect(),
        dropped,
    };
    result.remove_from(waitlist);
    result
}

/// Move the first two admittable players to red and blue together.
///
/// Loading players are skipped the same way as in [`pull_from_queue`].
/// Nobody is admitted unless two players are ready, but stale entries met
/// on the way are still dropped.
pub fn pull_pair(waitlist: &mut Waitlist, roster: &HashMap<PlayerId, PlayerInfo>) -> PullResult {
    let (admitted, dropped) = scan_queue(waitlist, roster, 2);
    let admitted = match admitted.as_slice() {
        [first, second] => vec![(*first, Team::Red), (*second, Team::Blue)],
        _ => Vec::new(),
    };
    let result = PullResult { admitted, dropped };
    result.remove_from(waitlist);
    result
}

// Walk the queue in order until `amount` admittable players are found
fn scan_queue(
    waitlist: &Waitlist,
    roster: &HashMap<PlayerId, PlayerInfo>,
    amount: usize,
) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let mut admitted = Vec::new();
    let mut dropped = Vec::new();
    for player in waitlist.queued() {
        if admitted.len() >= amount {
            break;
        }
        if is_admittable(roster, player) {
            admitted.push(player);
        } else if !is_loading(roster, player) {
            dropped.push(player);
        }
    }
    (admitted, dropped)
}

/// Whether the queue may move a team player onto `to`.
///
/// Only red and blue are targets. The target must be unlocked, the teams
/// below capacity, and the move must not leave the target larger than the
/// other team.
pub fn may_switch_team(
    counts: TeamCounts,
    max_players: usize,
    locks: TeamLocks,
    from: Team,
    to: Team,
) -> bool {
    let (target, other) = match to {
        Team::Red => (counts.red, counts.blue),
        Team::Blue => (counts.blue, counts.red),
        _ => return false,
    };
    if locks.is_locked(to) || counts.red + counts.blue >= max_players {
        return false;
    }
    let other_team = if to == Team::Red { Team::Blue } else { Team::Red };
    let target_after = target + usize::from(from != to);
    let other_after = other.saturating_sub(usize::from(from == other_team));
    target_after <= other_after
}

/// Queue and admission state machine
#[derive(Clone)]
pub struct AdmissionScheduler {
    /// Roster, game state and mutation hooks
    host: Arc<dyn GameHost>,
    /// Privilege predicate for commands
    privileges: Arc<dyn PrivilegeCheck>,
    /// Stored tag suffixes
    tag_store: Arc<dyn TagStore>,
    config: Arc<QueueConfig>,
    state: Arc<Mutex<QueueState>>,
    /// Set while an admission pass is sleeping
    push_pending: Arc<AtomicBool>,
    stats: Arc<RwLock<AdmissionStats>>,
    metrics_collector: Arc<MetricsCollector>,
    frames: mpsc::UnboundedSender<FrameTask>,
    frame_receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<FrameTask>>>>,
}

impl AdmissionScheduler {
    /// Create a new scheduler
    pub fn new(
        host: Arc<dyn GameHost>,
        privileges: Arc<dyn PrivilegeCheck>,
        tag_store: Arc<dyn TagStore>,
        config: QueueConfig,
    ) -> Self {
        // Create a default metrics collector if none provided
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(host, privileges, tag_store, config, metrics_collector)
    }

    /// Create a new scheduler with metrics collector
    pub fn with_metrics(
        host: Arc<dyn GameHost>,
        privileges: Arc<dyn PrivilegeCheck>,
        tag_store: Arc<dyn TagStore>,
        config: QueueConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let (frames, frame_receiver) = mpsc::unbounded_channel();
        let state = QueueState {
            // No game means we are between a game end and the next start
            end_screen: host.game().is_none(),
            ..QueueState::default()
        };

        Self {
            host,
            privileges,
            tag_store,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            push_pending: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(AdmissionStats::default())),
            metrics_collector,
            frames,
            frame_receiver: Arc::new(Mutex::new(Some(frame_receiver))),
        }
    }

    /// Start the frame worker and tag everyone already connected
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let mut receiver = self
            .frame_receiver
            .lock()
            .map_err(|_| QueueError::lock_poisoned("frame receiver"))?
            .take()
            .ok_or_else(|| QueueError::WorkerUnavailable {
                message: "frame worker already started".to_string(),
            })?;

        {
            let mut state = self.lock_state()?;
            state.locks.clear();
        }
        self.retag_all()?;

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            info!("Frame worker started");
            while let Some(task) = receiver.recv().await {
                scheduler.run_frame(task).await;
            }
            info!("Frame worker stopped");
        });

        Ok(handle)
    }

    /// Wait until every task queued so far has been processed
    pub async fn flush(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        self.send_frame(FrameTask::Barrier(done))?;
        finished.await.map_err(|_| QueueError::WorkerUnavailable {
            message: "frame worker dropped barrier".to_string(),
        })?;
        Ok(())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn host(&self) -> Arc<dyn GameHost> {
        self.host.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Scheduler statistics
    pub fn stats(&self) -> Result<AdmissionStats> {
        let stats = self
            .stats
            .read()
            .map_err(|_| QueueError::lock_poisoned("stats"))?;
        Ok(stats.clone())
    }

    /// Queued players in admission order
    pub fn queued_players(&self) -> Result<Vec<PlayerId>> {
        Ok(self.lock_state()?.waitlist.queued())
    }

    pub fn afk_players(&self) -> Result<Vec<PlayerId>> {
        Ok(self.lock_state()?.waitlist.afk())
    }

    pub fn position_of(&self, player: PlayerId) -> Result<Option<usize>> {
        Ok(self.lock_state()?.waitlist.position_of(player))
    }

    pub fn is_afk(&self, player: PlayerId) -> Result<bool> {
        Ok(self.lock_state()?.waitlist.is_afk(player))
    }

    /// Current annotation for a player
    pub fn tag_of(&self, player: PlayerId) -> Result<Option<String>> {
        Ok(self.lock_state()?.tags.get(player).map(str::to_string))
    }

    pub fn locks(&self) -> Result<TeamLocks> {
        Ok(self.lock_state()?.locks)
    }

    pub fn is_end_screen(&self) -> Result<bool> {
        Ok(self.lock_state()?.end_screen)
    }

    pub fn is_push_pending(&self) -> bool {
        self.push_pending.load(Ordering::Acquire)
    }

    /// Whether [`start`](Self::start) has taken the frame receiver
    pub fn is_worker_started(&self) -> bool {
        self.frame_receiver
            .lock()
            .map(|receiver| receiver.is_none())
            .unwrap_or(false)
    }

    /// Add a player to the queue, at `position` or at the tail.
    ///
    /// Newly queued players are announced to spectators. Every call tells
    /// the player they are queued and requests an immediate pass.
    pub fn enqueue(
        &self,
        player: PlayerId,
        position: Option<usize>,
        reason: &str,
    ) -> Result<EnqueueOutcome> {
        let (outcome, queue_position) = {
            let mut state = self.lock_state()?;
            let outcome = state.waitlist.enqueue(player, position);
            if outcome == EnqueueOutcome::Inserted {
                self.retag_queue(&mut state)?;
            }
            self.retag(&mut state, player)?;
            self.observe_sizes(&state);
            (outcome, state.waitlist.position_of(player))
        };

        if outcome != EnqueueOutcome::AlreadyQueued {
            let name = self.display_name(player);
            info!(
                "Player {} ({}) joined the queue at position {} - reason: {}",
                player,
                name,
                queue_position.map_or(0, |p| p + 1),
                reason
            );

            self.update_stats(|stats| stats.players_enqueued += 1)?;
            self.metrics_collector.record_enqueued(reason);

            for spectator in self.host.team_members(Team::Spectator) {
                if spectator.id != player {
                    self.send_frame(FrameTask::CenterPrint {
                        player: spectator.id,
                        message: format!("{} joined the Queue", name),
                    })?;
                }
            }
        }

        self.send_frame(FrameTask::CenterPrint {
            player,
            message: "You are in the queue to play".to_string(),
        })?;
        self.request_admission(Duration::ZERO);

        Ok(outcome)
    }

    /// Take a player out of the queue; returns whether they were queued
    pub fn remove(&self, player: PlayerId) -> Result<bool> {
        let mut state = self.lock_state()?;
        let removed = state.waitlist.remove(player);
        self.retag_queue(&mut state)?;
        self.retag(&mut state, player)?;
        self.observe_sizes(&state);
        if removed {
            debug!("Player {} left the queue", player);
        }
        Ok(removed)
    }

    /// Mark a spectator away. Fails for non-spectators and players who are
    /// already away.
    pub fn set_afk(&self, player: PlayerId) -> Result<bool> {
        let is_spectator = self
            .host
            .player(player)
            .is_some_and(|info| info.team.is_spectator());
        if !is_spectator {
            return Ok(false);
        }

        let mut state = self.lock_state()?;
        if !state.waitlist.mark_afk(player) {
            return Ok(false);
        }
        self.retag_queue(&mut state)?;
        self.retag(&mut state, player)?;
        self.observe_sizes(&state);
        info!("Player {} is now away", player);
        Ok(true)
    }

    /// Clear the away standing and retag; returns whether they were away
    pub fn clear_afk(&self, player: PlayerId) -> Result<bool> {
        let mut state = self.lock_state()?;
        let cleared = state.waitlist.clear_afk(player);
        self.retag(&mut state, player)?;
        self.observe_sizes(&state);
        Ok(cleared)
    }

    /// Recompute and push the tag of every connected player
    pub fn retag_all(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        for player in self.host.players() {
            self.retag(&mut state, player.id)?;
        }
        Ok(())
    }

    /// Re-derive the end-screen flag from whether the host reports a game
    ///
    /// Used once the first real host state arrives after startup.
    pub fn sync_end_screen(&self) -> Result<()> {
        let end_screen = self.host.game().is_none();
        self.lock_state()?.end_screen = end_screen;
        debug!("End-screen flag synced to {}", end_screen);
        Ok(())
    }

    /// A new match (or a restart) began
    pub fn on_match_start(&self) -> Result<()> {
        let game = self.host.game();
        let mut state = self.lock_state()?;
        state.end_screen = false;
        state.locks.clear();

        let unmanaged = game
            .as_ref()
            .is_some_and(|game| !game.class().is_managed());
        if unmanaged {
            let cleared = state.waitlist.clear_queue();
            info!(
                "Unmanaged gametype started, cleared {} queued players",
                cleared.len()
            );
            for player in self.host.players() {
                self.retag(&mut state, player.id)?;
            }
            self.observe_sizes(&state);
        } else {
            drop(state);
            self.request_admission(self.config.match_start_delay());
        }
        Ok(())
    }

    pub fn on_match_end(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        state.end_screen = true;
        debug!("Match ended, admissions paused until the next start");
        Ok(())
    }

    pub fn on_player_loaded(&self, player: PlayerId) -> Result<()> {
        let mut state = self.lock_state()?;
        self.retag(&mut state, player)
    }

    /// Forget everything about a departing player
    pub fn on_player_disconnected(&self, player: PlayerId) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if let Some(standing) = state.waitlist.forget(player) {
                debug!("Player {} disconnected while {:?}", player, standing);
            }
            state.tags.remove(player);
            self.retag_queue(&mut state)?;
            self.observe_sizes(&state);
        }
        self.request_admission(self.config.settle_delay());
        Ok(())
    }

    /// A team change went through
    pub fn on_team_changed(&self, player: PlayerId, new_team: Team) -> Result<()> {
        if new_team.is_spectator() {
            {
                let mut state = self.lock_state()?;
                self.retag(&mut state, player)?;
            }
            self.request_admission(self.config.settle_delay());
        } else {
            self.remove(player)?;
            self.clear_afk(player)?;
        }
        Ok(())
    }

    /// Decide on a player-initiated team change before it is committed
    pub fn on_team_change_attempt(
        &self,
        player: PlayerId,
        old_team: Team,
        new_team: Team,
    ) -> Result<Verdict> {
        let Some(game) = self.host.game() else {
            return Ok(Verdict::Allow);
        };
        if self.is_end_screen()? || !game.class().is_managed() {
            return Ok(Verdict::Allow);
        }

        if old_team.is_spectator() && !new_team.is_spectator() {
            let counts = TeamCounts::of(&self.host.players());
            let max = max_players(&game, self.host.max_clients());
            let (queue_waiting, locked) = {
                let state = self.lock_state()?;
                (!state.waitlist.is_empty(), state.locks.any_locked())
            };

            let must_wait = counts.red + counts.blue >= max
                || counts.free >= max
                || game.phase == MatchPhase::InProgress
                || queue_waiting
                || locked;

            if must_wait {
                info!(
                    "Vetoing join of player {} to {} (red {}, blue {}, free {}, max {}, phase {:?})",
                    player, new_team, counts.red, counts.blue, counts.free, max, game.phase
                );
                {
                    let mut state = self.lock_state()?;
                    state.waitlist.clear_afk(player);
                }
                self.enqueue(player, None, "join_attempt")?;
                self.update_stats(|stats| stats.joins_vetoed += 1)?;
                self.metrics_collector.record_verdict(Verdict::Veto);
                return Ok(Verdict::Veto);
            }

            self.metrics_collector.record_verdict(Verdict::Allow);
            return Ok(Verdict::Allow);
        }

        // Every other transition is performed by us, not by the host
        let locks = {
            let mut state = self.lock_state()?;
            self.retag(&mut state, player)?;
            state.locks
        };
        self.request_admission(self.config.settle_delay());
        let perform = if old_team == new_team {
            false
        } else if new_team.is_spectator() {
            true
        } else {
            let counts = TeamCounts::of(&self.host.players());
            let max = max_players(&game, self.host.max_clients());
            let allowed = may_switch_team(counts, max, locks, old_team, new_team);
            if !allowed {
                info!(
                    "Refusing to move player {} from {} to {} (red {}, blue {}, max {}, locked {})",
                    player,
                    old_team,
                    new_team,
                    counts.red,
                    counts.blue,
                    max,
                    locks.is_locked(new_team)
                );
            }
            allowed
        };
        if perform {
            self.send_frame(FrameTask::Move {
                player,
                team: new_team,
            })?;
        }
        self.metrics_collector.record_verdict(Verdict::Veto);
        Ok(Verdict::Veto)
    }

    pub fn on_vote_concluded(&self, vote: &str) -> Result<()> {
        if vote.eq_ignore_ascii_case("teamsize") {
            self.request_admission(self.config.vote_settle_delay());
        }
        Ok(())
    }

    /// Watch console output for team lock announcements
    pub fn on_console_print(&self, text: &str) -> Result<()> {
        let Some(announcement) = parse_lock_announcement(text) else {
            return Ok(());
        };

        let unlocked = {
            let mut state = self.lock_state()?;
            state.locks.apply(announcement)
        };
        info!(
            "The {} team is now {}",
            announcement.team,
            if announcement.locked { "locked" } else { "unlocked" }
        );
        if unlocked {
            self.request_admission(self.config.settle_delay());
        }
        Ok(())
    }

    /// A spectator asking to spectate leaves the queue
    pub fn on_client_command(&self, player: PlayerId, command: &str) -> Result<()> {
        if command.trim() != "team s" {
            return Ok(());
        }
        let is_spectator = self
            .host
            .player(player)
            .is_some_and(|info| info.team.is_spectator());
        if is_spectator {
            self.remove(player)?;
            self.send_frame(FrameTask::CenterPrint {
                player,
                message: "You are set to spectate only".to_string(),
            })?;
        }
        Ok(())
    }

    /// Rewrite the name keys of a player info string with the player's tag
    pub fn decorate_player_config(&self, player: PlayerId, value: &str) -> Result<Option<String>> {
        if value.is_empty() {
            return Ok(None);
        }
        let annotation = match self.tag_of(player)? {
            Some(annotation) => annotation,
            None => return Ok(None),
        };
        let stored = self.stored_tag(player);
        let rendered = render_tag(&annotation, stored.as_deref());
        Ok(Some(rewrite_name_keys(value, &rendered)))
    }

    /// Request an admission pass after `delay`.
    ///
    /// Dropped if a pass is already pending. Must be called from within a
    /// Tokio runtime.
    pub fn request_admission(&self, delay: Duration) {
        if self.push_pending.swap(true, Ordering::AcqRel) {
            debug!("Admission pass already pending, coalescing request");
            if let Err(e) = self.update_stats(|stats| stats.passes_coalesced += 1) {
                warn!("Failed to record coalesced pass: {}", e);
            }
            self.metrics_collector.record_pass("coalesced");
            return;
        }

        if let Err(e) = self.update_stats(|stats| stats.passes_requested += 1) {
            warn!("Failed to record pass request: {}", e);
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.push_pending.store(false, Ordering::Release);
            if let Err(e) = scheduler.begin_pass() {
                warn!("Failed to start admission pass: {}", e);
            }
        });
    }

    /// Check pass preconditions and hand the check to the frame worker
    fn begin_pass(&self) -> Result<()> {
        let (queue_empty, end_screen) = {
            let state = self.lock_state()?;
            (state.waitlist.is_empty(), state.end_screen)
        };
        let accepting = self
            .host
            .game()
            .is_some_and(|game| game.phase.accepts_admissions());

        if queue_empty || end_screen || !accepting {
            debug!(
                "Skipping admission pass - queue empty: {}, end screen: {}, accepting: {}",
                queue_empty, end_screen, accepting
            );
            self.metrics_collector.record_pass("skipped");
            return Ok(());
        }

        self.send_frame(FrameTask::CheckForPlace)
    }

    /// Fill open slots from the queue. Runs on the frame worker.
    async fn check_for_place(&self) -> Result<()> {
        let timer = self.metrics_collector.start_timer();
        let Some(game) = self.host.game() else {
            return Ok(());
        };
        let players = self.host.players();
        let counts = TeamCounts::of(&players);
        let max = max_players(&game, self.host.max_clients());
        let roster: HashMap<PlayerId, PlayerInfo> =
            players.into_iter().map(|player| (player.id, player)).collect();

        let (placement, pull) = {
            let mut state = self.lock_state()?;
            if state.end_screen {
                return Ok(());
            }

            let placement =
                plan_placement(&game, counts, max, state.waitlist.len(), state.locks);
            let pull = match placement {
                Placement::Nothing => PullResult::default(),
                Placement::Team { amount, team } => {
                    pull_from_queue(&mut state.waitlist, &roster, amount, team)
                }
                Placement::Both => pull_pair(&mut state.waitlist, &roster),
            };

            if !pull.is_empty() {
                self.retag_queue(&mut state)?;
                for player in &pull.dropped {
                    self.retag(&mut state, *player)?;
                }
                self.observe_sizes(&state);
            }
            (placement, pull)
        };

        debug!(
            "Admission pass - gametype: {}, red: {}, blue: {}, free: {}, max: {}, placement: {:?}",
            game.gametype, counts.red, counts.blue, counts.free, max, placement
        );

        self.update_stats(|stats| {
            stats.passes_executed += 1;
            stats.stale_dropped += pull.dropped.len() as u64;
            stats.last_pass_at = Some(current_timestamp());
        })?;
        self.metrics_collector.record_pass("executed");

        for player in &pull.dropped {
            info!("Dropped player {} from the queue, not admittable", player);
            self.metrics_collector.record_stale_dropped();
        }

        let mut moved = Vec::new();
        let mut failed = Vec::new();
        for (player, team) in &pull.admitted {
            info!("Admitting player {} to the {} team", player, team);
            match self.host.move_player(*player, *team).await {
                Ok(()) => {
                    self.metrics_collector.record_host_call("move", true);
                    self.metrics_collector.record_admitted(*team);
                    moved.push(*player);
                }
                Err(e) => {
                    warn!("Failed to move player {} to {}: {}", player, team, e);
                    self.metrics_collector.record_host_call("move", false);
                    failed.push(*player);
                }
            }
        }

        if !moved.is_empty() {
            self.update_stats(|stats| stats.players_admitted += moved.len() as u64)?;
        }

        if !pull.admitted.is_empty() {
            let mut state = self.lock_state()?;
            // Players whose move failed go back to the front in their old order
            for player in failed.iter().rev() {
                state.waitlist.enqueue(*player, Some(0));
            }
            if !failed.is_empty() {
                self.retag_queue(&mut state)?;
                self.observe_sizes(&state);
            }
            for player in &moved {
                self.retag(&mut state, *player)?;
            }
        }

        if placement == Placement::Both || !moved.is_empty() || !pull.dropped.is_empty() {
            self.request_admission(self.config.retry_delay());
        }

        self.metrics_collector.record_pass_duration(timer.stop());
        Ok(())
    }

    async fn run_frame(&self, task: FrameTask) {
        match task {
            FrameTask::CheckForPlace => {
                if let Err(e) = self.check_for_place().await {
                    error!("Admission pass failed: {}", e);
                }
            }
            FrameTask::Move { player, team } => {
                let result = self.host.move_player(player, team).await;
                self.metrics_collector
                    .record_host_call("move", result.is_ok());
                if let Err(e) = result {
                    warn!("Failed to move player {} to {}: {}", player, team, e);
                }
            }
            FrameTask::ApplyTag(player) => self.apply_tag(player).await,
            FrameTask::CenterPrint { player, message } => {
                if self.host.player(player).is_none() {
                    return;
                }
                let result = self.host.center_print(player, &message).await;
                self.metrics_collector
                    .record_host_call("center_print", result.is_ok());
                if let Err(e) = result {
                    warn!("Failed to print to player {}: {}", player, e);
                }
            }
            FrameTask::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn apply_tag(&self, player: PlayerId) {
        let annotation = match self.tag_of(player) {
            Ok(Some(annotation)) => annotation,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read tag of player {}: {}", player, e);
                return;
            }
        };
        if self.host.player(player).is_none() {
            return;
        }

        let stored = self.stored_tag(player);
        let rendered = render_tag(&annotation, stored.as_deref());
        let result = self.host.apply_tag(player, &rendered).await;
        self.metrics_collector
            .record_host_call("apply_tag", result.is_ok());
        if let Err(e) = result {
            warn!("Failed to apply tag to player {}: {}", player, e);
        }
    }

    /// Check a privilege level; collaborator failures deny
    pub fn is_privileged(&self, player: PlayerId, level: u8) -> bool {
        match self.privileges.has_permission(player, level) {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Privilege check for player {} failed: {}", player, e);
                false
            }
        }
    }

    /// Name for messages, falling back to the id
    pub fn display_name(&self, player: PlayerId) -> String {
        self.host
            .player(player)
            .map(|info| info.name)
            .unwrap_or_else(|| player.to_string())
    }

    fn stored_tag(&self, player: PlayerId) -> Option<String> {
        match self.tag_store.stored_tag(player) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to read stored tag of player {}: {}", player, e);
                None
            }
        }
    }

    /// Recompute one player's annotation and schedule it for the host
    fn retag(&self, state: &mut QueueState, player: PlayerId) -> Result<()> {
        let Some(info) = self.host.player(player) else {
            return Ok(());
        };
        let annotation = compute_tag(&TagContext {
            position: state.waitlist.position_of(player),
            afk: state.waitlist.is_afk(player),
            gametype: self.host.game().map(|game| game.class()),
            team: info.team,
            afk_label: &self.config.afk_tag,
        });
        state.tags.set(player, annotation);
        self.send_frame(FrameTask::ApplyTag(player))
    }

    fn retag_queue(&self, state: &mut QueueState) -> Result<()> {
        for player in state.waitlist.queued() {
            self.retag(state, player)?;
        }
        Ok(())
    }

    fn observe_sizes(&self, state: &QueueState) {
        self.metrics_collector
            .update_queue_sizes(state.waitlist.len(), state.waitlist.afk_count());
    }

    fn send_frame(&self, task: FrameTask) -> Result<()> {
        self.frames
            .send(task)
            .map_err(|_| QueueError::WorkerUnavailable {
                message: "frame channel closed".to_string(),
            })?;
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, QueueState>> {
        Ok(self
            .state
            .lock()
            .map_err(|_| QueueError::lock_poisoned("queue state"))?)
    }

    fn update_stats(&self, update: impl FnOnce(&mut AdmissionStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| QueueError::lock_poisoned("stats"))?;
        update(&mut stats);
        Ok(())
    }
}
