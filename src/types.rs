//! Common types used throughout the queue service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable numeric identity of a connected player
pub type PlayerId = u64;

/// Gametypes where players are split into red and blue
pub const TEAM_BASED_GAMETYPES: &[&str] = &["ca", "ctf", "dom", "ft", "tdm", "ad", "1f", "har"];

/// Gametypes where every active player shares the free pool
pub const SOLO_GAMETYPES: &[&str] = &["ffa", "race", "rr"];

/// Team a player can occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
    Free,
    Spectator,
}

impl Team {
    pub fn is_spectator(self) -> bool {
        self == Team::Spectator
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Red => write!(f, "red"),
            Team::Blue => write!(f, "blue"),
            Team::Free => write!(f, "free"),
            Team::Spectator => write!(f, "spectator"),
        }
    }
}

/// Connection state of a player slot as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Free,
    Zombie,
    Connected,
    Primed,
    Active,
}

impl ConnectionState {
    /// Fully in game and eligible to be put on a team
    pub fn is_active(self) -> bool {
        self == ConnectionState::Active
    }

    /// Still loading; keeps its queue position but cannot be admitted yet
    pub fn is_loading(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Primed)
    }
}

/// Phase of the current match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    PreGame,
    Warmup,
    InProgress,
    EndScreen,
}

impl MatchPhase {
    /// Phases in which players may be pulled from the queue
    pub fn accepts_admissions(self) -> bool {
        matches!(self, MatchPhase::Warmup | MatchPhase::InProgress)
    }
}

/// How a gametype distributes active players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GametypeClass {
    TeamBased,
    Solo,
    Other,
}

impl GametypeClass {
    pub fn of(gametype: &str) -> Self {
        let gametype = gametype.to_ascii_lowercase();
        if TEAM_BASED_GAMETYPES.contains(&gametype.as_str()) {
            GametypeClass::TeamBased
        } else if SOLO_GAMETYPES.contains(&gametype.as_str()) {
            GametypeClass::Solo
        } else {
            GametypeClass::Other
        }
    }

    /// Whether the queue manages this gametype at all
    pub fn is_managed(self) -> bool {
        self != GametypeClass::Other
    }
}

/// A player as seen in the host roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    pub connection_state: ConnectionState,
    /// Privilege level granted by the host, if it reports one
    #[serde(default)]
    pub permission: Option<u8>,
    /// Per-player tag suffix read from the host's key-value store
    #[serde(default)]
    pub stored_tag: Option<String>,
}

impl PlayerInfo {
    pub fn new(
        id: PlayerId,
        name: impl Into<String>,
        team: Team,
        connection_state: ConnectionState,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            connection_state,
            permission: None,
            stored_tag: None,
        }
    }
}

/// Current game as reported by the host; absent between games
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    /// Short gametype name such as `ca` or `ffa`
    pub gametype: String,
    pub phase: MatchPhase,
    /// Configured players per team (0 when unset)
    pub team_size: usize,
}

impl GameInfo {
    pub fn class(&self) -> GametypeClass {
        GametypeClass::of(&self.gametype)
    }
}

/// Full host state attached to inbound host messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub players: Vec<PlayerInfo>,
    pub game: Option<GameInfo>,
    pub max_clients: usize,
}

/// Events and commands delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    MatchStart,
    MatchEnd,
    PlayerLoaded {
        player: PlayerId,
    },
    PlayerDisconnected {
        player: PlayerId,
        #[serde(default)]
        reason: Option<String>,
    },
    TeamChanged {
        player: PlayerId,
        old_team: Team,
        new_team: Team,
    },
    TeamChangeAttempt {
        player: PlayerId,
        old_team: Team,
        new_team: Team,
    },
    VoteConcluded {
        vote: String,
        #[serde(default)]
        args: String,
        passed: bool,
    },
    ConsolePrint {
        text: String,
    },
    ClientCommand {
        player: PlayerId,
        command: String,
    },
    PlayerInfoChanged {
        player: PlayerId,
        value: String,
    },
    Command {
        caller: PlayerId,
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl HostEvent {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::MatchStart => "match_start",
            HostEvent::MatchEnd => "match_end",
            HostEvent::PlayerLoaded { .. } => "player_loaded",
            HostEvent::PlayerDisconnected { .. } => "player_disconnected",
            HostEvent::TeamChanged { .. } => "team_changed",
            HostEvent::TeamChangeAttempt { .. } => "team_change_attempt",
            HostEvent::VoteConcluded { .. } => "vote_concluded",
            HostEvent::ConsolePrint { .. } => "console_print",
            HostEvent::ClientCommand { .. } => "client_command",
            HostEvent::PlayerInfoChanged { .. } => "player_info_changed",
            HostEvent::Command { .. } => "command",
        }
    }
}

/// Inbound message body: an event plus the host state it was raised in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(default)]
    pub snapshot: Option<ServerSnapshot>,
    pub event: HostEvent,
}

/// Decision on a player-initiated team change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Veto,
}

/// Text sent back to whoever issued a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Reply on the channel the command came from
    Channel(String),
    /// Private message to a single player
    Tell { player: PlayerId, message: String },
}

/// Everything the dispatcher has to hand back to the host for one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
    pub verdict: Option<Verdict>,
    pub replies: Vec<Reply>,
    /// Rewritten player info string for `PlayerInfoChanged`
    pub player_info: Option<String>,
}

impl EventOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn verdict(verdict: Verdict) -> Self {
        Self {
            verdict: Some(verdict),
            ..Self::default()
        }
    }

    pub fn replies(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            ..Self::default()
        }
    }
}

/// Commands sent to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostCommand {
    MovePlayer {
        player: PlayerId,
        team: Team,
    },
    ApplyTag {
        player: PlayerId,
        tag: String,
    },
    CenterPrint {
        player: PlayerId,
        message: String,
    },
    Tell {
        player: PlayerId,
        message: String,
    },
    Reply {
        in_reply_to: String,
        message: String,
    },
    Verdict {
        in_reply_to: String,
        allow: bool,
    },
    PlayerInfo {
        in_reply_to: String,
        player: PlayerId,
        value: String,
    },
}

/// Counters describing the scheduler's work since start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStats {
    /// Admission passes that took the gate
    pub passes_requested: u64,
    /// Requests dropped because a pass was already pending
    pub passes_coalesced: u64,
    /// Passes that reached the placement check
    pub passes_executed: u64,
    pub players_enqueued: u64,
    pub players_admitted: u64,
    pub stale_dropped: u64,
    pub joins_vetoed: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
}
