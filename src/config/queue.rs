//! Queue behaviour configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the waiting list and admission scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Label shown in the tag of away players
    pub afk_tag: String,
    /// Privilege level needed to mark someone else away
    pub afk_permission: u8,
    /// Privilege level needed for qpush, qadd and qupd
    pub admin_permission: u8,
    /// Delay before retrying a pass that admitted or dropped someone
    pub retry_delay_ms: u64,
    /// Delay used after disconnects, team switches and unlocks
    pub settle_delay_ms: u64,
    /// Delay used after a team size vote passes
    pub vote_settle_delay_ms: u64,
    /// Delay before the first pass of a new match
    pub match_start_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            afk_tag: "^3AFK".to_string(),
            afk_permission: 2,
            admin_permission: 5,
            retry_delay_ms: 500,
            settle_delay_ms: 500,
            vote_settle_delay_ms: 4000,
            match_start_delay_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn vote_settle_delay(&self) -> Duration {
        Duration::from_millis(self.vote_settle_delay_ms)
    }

    pub fn match_start_delay(&self) -> Duration {
        Duration::from_millis(self.match_start_delay_ms)
    }
}
