//! Utility functions for the queue service

use crate::types::PlayerId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new correlation id for outbound messages
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a player id typed by a user, rejecting anything that is not a number
pub fn parse_player_id(input: &str) -> Option<PlayerId> {
    input.trim().parse::<PlayerId>().ok()
}

/// Strip `^N` colour codes from a player name
pub fn strip_colors(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}
