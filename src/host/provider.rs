//! Collaborator traits for the game host
//!
//! The queue core never talks to a server directly. Roster and game
//! queries, team moves, tag updates and prints all go through [`GameHost`];
//! privilege checks and the stored tag suffix come from their own narrow
//! traits so they can be swapped or mocked independently.

use crate::error::Result;
use crate::types::{GameInfo, PlayerId, PlayerInfo, Team};
use crate::utils::strip_colors;
use async_trait::async_trait;

/// Roster, game state and mutation hooks of a match server
#[async_trait]
pub trait GameHost: Send + Sync {
    /// Every player slot the host currently reports
    fn players(&self) -> Vec<PlayerInfo>;

    /// Current game, or `None` between games
    fn game(&self) -> Option<GameInfo>;

    /// Server-wide client cap, used when no team size is configured
    fn max_clients(&self) -> usize;

    fn player(&self, id: PlayerId) -> Option<PlayerInfo> {
        self.players().into_iter().find(|player| player.id == id)
    }

    /// Resolve a player by numeric id or by a case-insensitive name fragment
    fn find_player(&self, query: &str) -> Option<PlayerInfo> {
        if let Ok(id) = query.trim().parse::<PlayerId>() {
            return self.player(id);
        }

        let needle = strip_colors(query).to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let players = self.players();
        if let Some(exact) = players
            .iter()
            .find(|player| strip_colors(&player.name).to_lowercase() == needle)
        {
            return Some(exact.clone());
        }
        let mut matches = players
            .into_iter()
            .filter(|player| strip_colors(&player.name).to_lowercase().contains(&needle));
        let first = matches.next()?;
        // Ambiguous fragments resolve to nobody
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// Players currently on the given team
    fn team_members(&self, team: Team) -> Vec<PlayerInfo> {
        self.players()
            .into_iter()
            .filter(|player| player.team == team)
            .collect()
    }

    async fn move_player(&self, player: PlayerId, team: Team) -> Result<()>;

    async fn apply_tag(&self, player: PlayerId, tag: &str) -> Result<()>;

    async fn center_print(&self, player: PlayerId, message: &str) -> Result<()>;
}

/// Opaque privilege predicate supplied by the host
#[cfg_attr(test, mockall::automock)]
pub trait PrivilegeCheck: Send + Sync {
    /// Whether `player` holds at least `level`. Errors are treated as denied.
    fn has_permission(&self, player: PlayerId, level: u8) -> Result<bool>;
}

/// Read-only access to the per-player tag suffix in the host's store
#[cfg_attr(test, mockall::automock)]
pub trait TagStore: Send + Sync {
    fn stored_tag(&self, player: PlayerId) -> Result<Option<String>>;
}

/// Privilege check that grants nothing
#[derive(Debug, Clone, Default)]
pub struct DenyAll;

impl PrivilegeCheck for DenyAll {
    fn has_permission(&self, _player: PlayerId, _level: u8) -> Result<bool> {
        Ok(false)
    }
}

/// Tag store with no stored suffixes
#[derive(Debug, Clone, Default)]
pub struct NoStoredTags;

impl TagStore for NoStoredTags {
    fn stored_tag(&self, _player: PlayerId) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState;

    struct Roster(Vec<PlayerInfo>);

    #[async_trait]
    impl GameHost for Roster {
        fn players(&self) -> Vec<PlayerInfo> {
            self.0.clone()
        }

        fn game(&self) -> Option<GameInfo> {
            None
        }

        fn max_clients(&self) -> usize {
            16
        }

        async fn move_player(&self, _player: PlayerId, _team: Team) -> Result<()> {
            Ok(())
        }

        async fn apply_tag(&self, _player: PlayerId, _tag: &str) -> Result<()> {
            Ok(())
        }

        async fn center_print(&self, _player: PlayerId, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    fn roster() -> Roster {
        Roster(vec![
            PlayerInfo::new(1, "^1Rail^7Gun", Team::Red, ConnectionState::Active),
            PlayerInfo::new(2, "Rocket", Team::Blue, ConnectionState::Active),
            PlayerInfo::new(3, "RocketMan", Team::Spectator, ConnectionState::Active),
        ])
    }

    #[test]
    fn test_find_player_by_id() {
        let host = roster();
        assert_eq!(host.find_player("2").map(|p| p.id), Some(2));
        assert!(host.find_player("9").is_none());
    }

    #[test]
    fn test_find_player_by_name_fragment() {
        let host = roster();
        assert_eq!(host.find_player("railg").map(|p| p.id), Some(1));
        assert_eq!(host.find_player("MAN").map(|p| p.id), Some(3));
        // Exact name wins over a longer match
        assert_eq!(host.find_player("rocket").map(|p| p.id), Some(2));
        // Matches two players
        assert!(host.find_player("rock").is_none());
        assert!(host.find_player("").is_none());
    }

    #[test]
    fn test_team_members() {
        let host = roster();
        let spectators = host.team_members(Team::Spectator);
        assert_eq!(spectators.len(), 1);
        assert_eq!(spectators[0].id, 3);
    }

    #[test]
    fn test_mocked_privilege_check() {
        let mut privileges = MockPrivilegeCheck::new();
        privileges
            .expect_has_permission()
            .returning(|player, level| Ok(player == 1 && level <= 5));
        assert!(privileges.has_permission(1, 5).unwrap());
        assert!(!privileges.has_permission(2, 2).unwrap());
    }

    #[test]
    fn test_defaults_grant_nothing() {
        assert!(!DenyAll.has_permission(1, 0).unwrap());
        assert!(NoStoredTags.stored_tag(1).unwrap().is_none());
    }
}
