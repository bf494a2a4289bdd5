//! AMQP message definitions and serialization

use crate::error::{QueueError, Result};
use crate::types::*;
use crate::utils::{current_timestamp, generate_correlation_id};
use serde_json;
use std::collections::HashSet;

/// Queue the host publishes events to
pub const HOST_EVENTS_QUEUE: &str = "team_queue.host_events";
/// Topic exchange commands for the host are published on
pub const HOST_COMMANDS_EXCHANGE: &str = "team_queue.host_commands";

/// Routing key stamped on host event envelopes
pub const HOST_EVENT_ROUTING_KEY: &str = "host.event";

/// Routing keys for host commands
pub const MOVE_ROUTING_KEY: &str = "command.move";
pub const TAG_ROUTING_KEY: &str = "command.tag";
pub const PRINT_ROUTING_KEY: &str = "command.print";
pub const TELL_ROUTING_KEY: &str = "command.tell";
pub const REPLY_ROUTING_KEY: &str = "command.reply";
pub const VERDICT_ROUTING_KEY: &str = "command.verdict";
pub const PLAYER_INFO_ROUTING_KEY: &str = "command.player_info";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: generate_correlation_id(),
            timestamp: current_timestamp(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            QueueError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            QueueError::InvalidHostMessage {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Deserialize and validate a host message envelope
    pub fn deserialize_host_message(bytes: &[u8]) -> Result<MessageEnvelope<HostMessage>> {
        let envelope = MessageEnvelope::<HostMessage>::from_bytes(bytes)?;
        Self::validate_host_message(&envelope.payload)?;
        Ok(envelope)
    }

    /// Validate a host message
    pub fn validate_host_message(message: &HostMessage) -> Result<()> {
        if let Some(snapshot) = &message.snapshot {
            let mut seen = HashSet::new();
            for player in &snapshot.players {
                if !seen.insert(player.id) {
                    return Err(QueueError::InvalidHostMessage {
                        reason: format!("Duplicate player id {} in snapshot", player.id),
                    }
                    .into());
                }
            }

            if snapshot.max_clients == 0 {
                return Err(QueueError::InvalidHostMessage {
                    reason: "Snapshot max_clients must be positive".to_string(),
                }
                .into());
            }

            if let Some(game) = &snapshot.game {
                if game.gametype.is_empty() {
                    return Err(QueueError::InvalidHostMessage {
                        reason: "Gametype cannot be empty".to_string(),
                    }
                    .into());
                }
            }
        }

        if let HostEvent::Command { name, .. } = &message.event {
            if name.trim().is_empty() {
                return Err(QueueError::InvalidHostMessage {
                    reason: "Command name cannot be empty".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            QueueError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Get routing key for a host command
    pub fn get_routing_key(command: &HostCommand) -> &'static str {
        match command {
            HostCommand::MovePlayer { .. } => MOVE_ROUTING_KEY,
            HostCommand::ApplyTag { .. } => TAG_ROUTING_KEY,
            HostCommand::CenterPrint { .. } => PRINT_ROUTING_KEY,
            HostCommand::Tell { .. } => TELL_ROUTING_KEY,
            HostCommand::Reply { .. } => REPLY_ROUTING_KEY,
            HostCommand::Verdict { .. } => VERDICT_ROUTING_KEY,
            HostCommand::PlayerInfo { .. } => PLAYER_INFO_ROUTING_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_snapshot() -> ServerSnapshot {
        ServerSnapshot {
            players: vec![
                PlayerInfo::new(1, "Anarki", Team::Red, ConnectionState::Active),
                PlayerInfo::new(2, "Sarge", Team::Spectator, ConnectionState::Active),
            ],
            game: Some(GameInfo {
                gametype: "ca".to_string(),
                phase: MatchPhase::Warmup,
                team_size: 4,
            }),
            max_clients: 16,
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let message = HostMessage {
            snapshot: None,
            event: HostEvent::MatchEnd,
        };
        let envelope = MessageEnvelope::new(message, HOST_EVENT_ROUTING_KEY.to_string());

        assert_eq!(envelope.routing_key, "host.event");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_deserialize_host_message_json() {
        let json = r#"{
            "payload": {
                "snapshot": {
                    "players": [
                        {"id": 7, "name": "Doom", "team": "spectator", "connection_state": "active", "permission": 5}
                    ],
                    "game": {"gametype": "ctf", "phase": "in_progress", "team_size": 5},
                    "max_clients": 16
                },
                "event": {"type": "TeamChangeAttempt", "player": 7, "old_team": "spectator", "new_team": "red"}
            },
            "correlation_id": "abc-123",
            "timestamp": "2026-10-18T12:00:00Z",
            "routing_key": "host.event"
        }"#;

        let envelope = MessageUtils::deserialize_host_message(json.as_bytes()).unwrap();
        assert_eq!(envelope.correlation_id, "abc-123");
        let snapshot = envelope.payload.snapshot.unwrap();
        assert_eq!(snapshot.players[0].permission, Some(5));
        assert!(snapshot.players[0].stored_tag.is_none());
        assert_eq!(
            envelope.payload.event,
            HostEvent::TeamChangeAttempt {
                player: 7,
                old_team: Team::Spectator,
                new_team: Team::Red
            }
        );
    }

    #[test]
    fn test_host_message_validation() {
        let valid = HostMessage {
            snapshot: Some(create_test_snapshot()),
            event: HostEvent::MatchStart,
        };
        assert!(MessageUtils::validate_host_message(&valid).is_ok());

        // Duplicate player ids
        let mut snapshot = create_test_snapshot();
        snapshot.players[1].id = 1;
        let invalid = HostMessage {
            snapshot: Some(snapshot),
            event: HostEvent::MatchStart,
        };
        assert!(MessageUtils::validate_host_message(&invalid).is_err());

        // No client slots
        let mut snapshot = create_test_snapshot();
        snapshot.max_clients = 0;
        let invalid = HostMessage {
            snapshot: Some(snapshot),
            event: HostEvent::MatchStart,
        };
        assert!(MessageUtils::validate_host_message(&invalid).is_err());

        // Blank command
        let invalid = HostMessage {
            snapshot: None,
            event: HostEvent::Command {
                caller: 1,
                name: " ".to_string(),
                args: vec![],
            },
        };
        assert!(MessageUtils::validate_host_message(&invalid).is_err());
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        let err = MessageUtils::deserialize_host_message(b"{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid host message"));
    }

    #[test]
    fn test_routing_key_generation() {
        let command = HostCommand::MovePlayer {
            player: 1,
            team: Team::Blue,
        };
        assert_eq!(MessageUtils::get_routing_key(&command), MOVE_ROUTING_KEY);

        let verdict = HostCommand::Verdict {
            in_reply_to: "abc".to_string(),
            allow: false,
        };
        assert_eq!(MessageUtils::get_routing_key(&verdict), VERDICT_ROUTING_KEY);
    }
}
