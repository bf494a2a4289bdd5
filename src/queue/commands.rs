//! Chat commands
//!
//! `q`/`queue`, `afk [target]`, `here`, `qversion` and `teamsize`/`ts` are
//! open to everyone. `qpush`, `qadd` and `qupd` need the admin privilege
//! level.

use crate::error::Result;
use crate::queue::scheduler::AdmissionScheduler;
use crate::types::{PlayerId, Reply};
use crate::utils::parse_player_id;
use std::time::Duration;
use tracing::{debug, info};

/// Names of every command the queue answers to
pub const COMMANDS: &[&str] = &[
    "q", "queue", "afk", "here", "qversion", "teamsize", "ts", "qpush", "qadd", "qupd",
];

const NO_PERMISSION: &str = "^7You don't have permission to use that command.";

impl AdmissionScheduler {
    /// Run a chat command on behalf of `caller` and collect the replies
    pub fn handle_command(
        &self,
        caller: PlayerId,
        name: &str,
        args: &[String],
    ) -> Result<Vec<Reply>> {
        let name = name.trim_start_matches('!').to_ascii_lowercase();
        debug!("Command '{}' from player {} with args {:?}", name, caller, args);

        match name.as_str() {
            "q" | "queue" => self.cmd_show_queue(),
            "afk" => self.cmd_afk(caller, args.first().map(String::as_str)),
            "here" => self.cmd_here(caller),
            "qversion" => Ok(vec![Reply::Channel(format!(
                "^7This server runs ^2team-queue {}^7.",
                crate::VERSION
            ))]),
            "teamsize" | "ts" => {
                self.request_admission(self.config().settle_delay());
                Ok(Vec::new())
            }
            "qpush" | "qadd" | "qupd" => {
                if !self.is_privileged(caller, self.config().admin_permission) {
                    return Ok(vec![tell(caller, NO_PERMISSION)]);
                }
                match name.as_str() {
                    "qpush" => {
                        info!("Player {} forced an admission pass", caller);
                        self.request_admission(Duration::ZERO);
                        Ok(Vec::new())
                    }
                    "qadd" => self.cmd_queue_add(caller, args.first().map(String::as_str)),
                    _ => {
                        info!("Player {} forced a retag of everyone", caller);
                        self.retag_all()?;
                        Ok(Vec::new())
                    }
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    fn cmd_show_queue(&self) -> Result<Vec<Reply>> {
        let queued = self.queued_players()?;
        let afk = self.afk_players()?;

        let mut replies = Vec::new();
        if queued.is_empty() {
            replies.push(Reply::Channel("^7No one in queue.".to_string()));
        } else {
            let mut line = "^1Queue^7 >> ".to_string();
            for (index, player) in queued.iter().enumerate() {
                line.push_str(&format!("{}^7({}) ", self.display_name(*player), index + 1));
            }
            replies.push(Reply::Channel(line));
        }

        if !afk.is_empty() {
            let mut line = "^3Away^7 >> ".to_string();
            for player in &afk {
                line.push_str(&self.display_name(*player));
                line.push(' ');
            }
            replies.push(Reply::Channel(line));
        }

        Ok(replies)
    }

    fn cmd_afk(&self, caller: PlayerId, target: Option<&str>) -> Result<Vec<Reply>> {
        if let Some(query) = target {
            if !self.is_privileged(caller, self.config().afk_permission) {
                return Ok(vec![tell(
                    caller,
                    "^7You don't have permission to set others AFK.",
                )]);
            }
            let Some(target) = self.host().find_player(query) else {
                return Ok(vec![tell(
                    caller,
                    &format!("^7Couldn't find a player matching {}.", query),
                )]);
            };

            let message = if self.set_afk(target.id)? {
                format!("^7Status for {} has been set to ^3AFK^7.", target.name)
            } else {
                format!("Couldn't set status for {} to AFK.", target.name)
            };
            return Ok(vec![tell(caller, &message)]);
        }

        let message = if self.set_afk(caller)? {
            "^7Your status has been set to ^3AFK^7."
        } else {
            "^7Couldn't set your status to AFK."
        };
        Ok(vec![tell(caller, message)])
    }

    fn cmd_here(&self, caller: PlayerId) -> Result<Vec<Reply>> {
        self.clear_afk(caller)?;
        Ok(vec![tell(
            caller,
            "^7Your status has been set to ^2AVAILABLE^7.",
        )])
    }

    fn cmd_queue_add(&self, caller: PlayerId, target: Option<&str>) -> Result<Vec<Reply>> {
        let target = match target {
            None => caller,
            Some(input) => match parse_player_id(input) {
                Some(id) if self.host().player(id).is_some() => id,
                _ => return Ok(vec![Reply::Channel("Invalid ID.".to_string())]),
            },
        };

        info!("Player {} added player {} to the queue", caller, target);
        self.enqueue(target, None, "admin")?;
        Ok(Vec::new())
    }
}

fn tell(player: PlayerId, message: &str) -> Reply {
    Reply::Tell {
        player,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_lowercase() {
        for name in COMMANDS {
            assert_eq!(*name, name.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_tell_builder() {
        assert_eq!(
            tell(3, "hi"),
            Reply::Tell {
                player: 3,
                message: "hi".to_string()
            }
        );
    }
}
