//! Team lock state
//!
//! Locks are learned from the server's broadcast text. The text matching
//! lives in [`parse_lock_announcement`] alone, so a structured lock event
//! can replace it without touching the scheduler.

use crate::types::Team;

/// A lock or unlock observed for one team
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockAnnouncement {
    pub team: Team,
    pub locked: bool,
}

const ANNOUNCEMENTS: &[(&str, Team, bool)] = &[
    ("broadcast: print \"The RED team is now locked", Team::Red, true),
    ("broadcast: print \"The BLUE team is now locked", Team::Blue, true),
    ("broadcast: print \"The RED team is now unlocked", Team::Red, false),
    ("broadcast: print \"The BLUE team is now unlocked", Team::Blue, false),
];

/// Translate raw console text into a lock change, if it is one
pub fn parse_lock_announcement(text: &str) -> Option<LockAnnouncement> {
    ANNOUNCEMENTS
        .iter()
        .find(|(pattern, _, _)| text.contains(pattern))
        .map(|(_, team, locked)| LockAnnouncement {
            team: *team,
            locked: *locked,
        })
}

/// Red and blue lock flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamLocks {
    pub red: bool,
    pub blue: bool,
}

impl TeamLocks {
    pub fn is_locked(&self, team: Team) -> bool {
        match team {
            Team::Red => self.red,
            Team::Blue => self.blue,
            Team::Free | Team::Spectator => false,
        }
    }

    pub fn any_locked(&self) -> bool {
        self.red || self.blue
    }

    /// Record an announcement; returns true when it unlocked a team
    pub fn apply(&mut self, announcement: LockAnnouncement) -> bool {
        match announcement.team {
            Team::Red => self.red = announcement.locked,
            Team::Blue => self.blue = announcement.locked,
            Team::Free | Team::Spectator => return false,
        }
        !announcement.locked
    }

    pub fn clear(&mut self) {
        self.red = false;
        self.blue = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcements() {
        let red_locked = parse_lock_announcement(
            "broadcast: print \"The RED team is now locked\n\"",
        );
        assert_eq!(
            red_locked,
            Some(LockAnnouncement {
                team: Team::Red,
                locked: true
            })
        );

        let blue_unlocked = parse_lock_announcement(
            "broadcast: print \"The BLUE team is now unlocked\n\"",
        );
        assert_eq!(
            blue_unlocked,
            Some(LockAnnouncement {
                team: Team::Blue,
                locked: false
            })
        );
    }

    #[test]
    fn test_unrelated_text_ignored() {
        assert!(parse_lock_announcement("broadcast: print \"Player connected\"").is_none());
        assert!(parse_lock_announcement("The RED team is now locked").is_none());
    }

    #[test]
    fn test_apply_reports_unlocks() {
        let mut locks = TeamLocks::default();
        assert!(!locks.apply(LockAnnouncement {
            team: Team::Blue,
            locked: true
        }));
        assert!(locks.is_locked(Team::Blue));
        assert!(locks.any_locked());

        assert!(locks.apply(LockAnnouncement {
            team: Team::Blue,
            locked: false
        }));
        assert!(!locks.any_locked());
    }

    #[test]
    fn test_clear() {
        let mut locks = TeamLocks { red: true, blue: true };
        locks.clear();
        assert_eq!(locks, TeamLocks::default());
        assert!(!locks.is_locked(Team::Free));
    }
}
