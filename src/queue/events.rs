//! Host event dispatch
//!
//! Routes each [`HostEvent`] to the matching scheduler hook and packs the
//! result into an [`EventOutcome`] for the transport to send back.

use crate::error::Result;
use crate::queue::commands::COMMANDS;
use crate::queue::scheduler::AdmissionScheduler;
use crate::types::{EventOutcome, HostEvent};
use std::time::Instant;
use tracing::debug;

/// Delivers host events to the scheduler
#[derive(Clone)]
pub struct EventDispatcher {
    scheduler: AdmissionScheduler,
}

impl EventDispatcher {
    pub fn new(scheduler: AdmissionScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &AdmissionScheduler {
        &self.scheduler
    }

    /// Handle one event
    pub fn dispatch(&self, event: &HostEvent) -> Result<EventOutcome> {
        let start = Instant::now();
        let scheduler = &self.scheduler;

        let outcome = match event {
            HostEvent::MatchStart => {
                scheduler.on_match_start()?;
                EventOutcome::none()
            }
            HostEvent::MatchEnd => {
                scheduler.on_match_end()?;
                EventOutcome::none()
            }
            HostEvent::PlayerLoaded { player } => {
                scheduler.on_player_loaded(*player)?;
                EventOutcome::none()
            }
            HostEvent::PlayerDisconnected { player, reason } => {
                debug!(
                    "Player {} disconnected: {}",
                    player,
                    reason.as_deref().unwrap_or("no reason")
                );
                scheduler.on_player_disconnected(*player)?;
                EventOutcome::none()
            }
            HostEvent::TeamChanged {
                player, new_team, ..
            } => {
                scheduler.on_team_changed(*player, *new_team)?;
                EventOutcome::none()
            }
            HostEvent::TeamChangeAttempt {
                player,
                old_team,
                new_team,
            } => EventOutcome::verdict(scheduler.on_team_change_attempt(
                *player, *old_team, *new_team,
            )?),
            HostEvent::VoteConcluded { vote, .. } => {
                scheduler.on_vote_concluded(vote)?;
                EventOutcome::none()
            }
            HostEvent::ConsolePrint { text } => {
                scheduler.on_console_print(text)?;
                EventOutcome::none()
            }
            HostEvent::ClientCommand { player, command } => {
                scheduler.on_client_command(*player, command)?;
                EventOutcome::none()
            }
            HostEvent::PlayerInfoChanged { player, value } => EventOutcome {
                player_info: scheduler.decorate_player_config(*player, value)?,
                ..EventOutcome::default()
            },
            HostEvent::Command { caller, name, args } => {
                let name = name.trim_start_matches('!').to_ascii_lowercase();
                if !COMMANDS.contains(&name.as_str()) {
                    return Ok(EventOutcome::none());
                }
                EventOutcome::replies(scheduler.handle_command(*caller, &name, args)?)
            }
        };

        debug!(
            "Dispatched {} in {:.2}ms",
            event.kind(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(outcome)
    }
}
