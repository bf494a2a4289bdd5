//! Game host backed by the AMQP transport
//!
//! The host attaches a [`ServerSnapshot`] to the messages it sends; the
//! mirror keeps the latest one for the scheduler's synchronous queries and
//! turns host mutations into [`HostCommand`]s on the commands exchange.

use crate::amqp::publisher::CommandPublisher;
use crate::error::{QueueError, Result};
use crate::host::provider::{GameHost, PrivilegeCheck, TagStore};
use crate::types::{GameInfo, HostCommand, HostEvent, PlayerId, PlayerInfo, ServerSnapshot, Team};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Local copy of the host's state plus a command channel back to it
pub struct HostMirror {
    snapshot: RwLock<ServerSnapshot>,
    publisher: Arc<dyn CommandPublisher>,
}

impl HostMirror {
    pub fn new(publisher: Arc<dyn CommandPublisher>) -> Self {
        Self::with_snapshot(publisher, ServerSnapshot::default())
    }

    pub fn with_snapshot(publisher: Arc<dyn CommandPublisher>, snapshot: ServerSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            publisher,
        }
    }

    /// Replace the mirrored state with a fresh snapshot from the host
    pub fn apply_snapshot(&self, snapshot: ServerSnapshot) -> Result<()> {
        let mut current = self
            .snapshot
            .write()
            .map_err(|_| QueueError::lock_poisoned("host snapshot"))?;
        debug!(
            "Applied host snapshot with {} players",
            snapshot.players.len()
        );
        *current = snapshot;
        Ok(())
    }

    /// Fold an event into the mirrored state when it arrived without a snapshot
    pub fn observe_event(&self, event: &HostEvent) -> Result<()> {
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| QueueError::lock_poisoned("host snapshot"))?;

        match event {
            HostEvent::PlayerDisconnected { player, .. } => {
                snapshot.players.retain(|p| p.id != *player);
            }
            HostEvent::TeamChanged {
                player, new_team, ..
            } => {
                if let Some(p) = snapshot.players.iter_mut().find(|p| p.id == *player) {
                    p.team = *new_team;
                }
            }
            HostEvent::MatchEnd => {
                snapshot.game = None;
            }
            _ => {}
        }
        Ok(())
    }

    /// Copy of the mirrored state
    pub fn snapshot(&self) -> ServerSnapshot {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    pub fn publisher(&self) -> Arc<dyn CommandPublisher> {
        self.publisher.clone()
    }

    fn with_player<T>(&self, id: PlayerId, f: impl FnOnce(&PlayerInfo) -> T) -> Result<Option<T>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| QueueError::lock_poisoned("host snapshot"))?;
        Ok(snapshot.players.iter().find(|p| p.id == id).map(f))
    }
}

#[async_trait]
impl GameHost for HostMirror {
    fn players(&self) -> Vec<PlayerInfo> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.players.clone())
            .unwrap_or_default()
    }

    fn game(&self) -> Option<GameInfo> {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| snapshot.game.clone())
    }

    fn max_clients(&self) -> usize {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.max_clients)
            .unwrap_or_default()
    }

    async fn move_player(&self, player: PlayerId, team: Team) -> Result<()> {
        // Assume the move lands so later passes count the new team before
        // the host confirms it
        let previous = {
            let mut snapshot = self
                .snapshot
                .write()
                .map_err(|_| QueueError::lock_poisoned("host snapshot"))?;
            match snapshot.players.iter_mut().find(|p| p.id == player) {
                Some(p) => Some(std::mem::replace(&mut p.team, team)),
                None => {
                    warn!("Moving player {} who is not in the snapshot", player);
                    None
                }
            }
        };

        let result = self
            .publisher
            .publish_command(HostCommand::MovePlayer { player, team })
            .await;

        if let (Err(_), Some(previous)) = (&result, previous) {
            let mut snapshot = self
                .snapshot
                .write()
                .map_err(|_| QueueError::lock_poisoned("host snapshot"))?;
            if let Some(p) = snapshot
                .players
                .iter_mut()
                .find(|p| p.id == player && p.team == team)
            {
                p.team = previous;
            }
        }
        result
    }

    async fn apply_tag(&self, player: PlayerId, tag: &str) -> Result<()> {
        self.publisher
            .publish_command(HostCommand::ApplyTag {
                player,
                tag: tag.to_string(),
            })
            .await
    }

    async fn center_print(&self, player: PlayerId, message: &str) -> Result<()> {
        self.publisher
            .publish_command(HostCommand::CenterPrint {
                player,
                message: message.to_string(),
            })
            .await
    }
}

impl PrivilegeCheck for HostMirror {
    fn has_permission(&self, player: PlayerId, level: u8) -> Result<bool> {
        match self.with_player(player, |p| p.permission)? {
            Some(permission) => Ok(permission.unwrap_or(0) >= level),
            None => Err(QueueError::PlayerNotFound { player_id: player }.into()),
        }
    }
}

impl TagStore for HostMirror {
    fn stored_tag(&self, player: PlayerId) -> Result<Option<String>> {
        Ok(self
            .with_player(player, |p| p.stored_tag.clone())?
            .flatten()
            .filter(|tag| !tag.is_empty()))
    }
}
