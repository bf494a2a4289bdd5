//! Display tag annotations
//!
//! Every known player carries a short annotation describing where they
//! stand: their queue position, the away label, or a spectator marker.
//! The annotation is combined with the player's stored tag suffix before
//! it is handed to the host.

use crate::types::{GametypeClass, PlayerId, Team};
use std::collections::HashMap;

/// Marker shown for spectators who are neither queued nor away
pub const SPECTATOR_TAG: &str = "(s)";

/// Inputs to [`compute_tag`]
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    /// Zero-based queue position, if queued
    pub position: Option<usize>,
    pub afk: bool,
    /// Gametype class of the current game; `None` between games
    pub gametype: Option<GametypeClass>,
    pub team: Team,
    pub afk_label: &'a str,
}

/// Annotation for a player in the given situation
pub fn compute_tag(ctx: &TagContext<'_>) -> String {
    if let Some(position) = ctx.position {
        return format!("({})", position + 1);
    }
    if ctx.afk {
        return format!("({})", ctx.afk_label);
    }
    if matches!(ctx.gametype, Some(class) if !class.is_managed()) {
        return String::new();
    }
    if ctx.team.is_spectator() {
        return SPECTATOR_TAG.to_string();
    }
    String::new()
}

/// Annotation followed by the stored suffix, space separated
pub fn render_tag(annotation: &str, stored: Option<&str>) -> String {
    match stored {
        Some(suffix) if annotation.is_empty() => suffix.to_string(),
        Some(suffix) => format!("{} {}", annotation, suffix),
        None => annotation.to_string(),
    }
}

/// Replace the `cn` and `xcn` keys of a backslash-delimited info string.
///
/// Key order is preserved; missing keys are appended in `xcn`, `cn` order.
pub fn rewrite_name_keys(value: &str, tag: &str) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut parts = value.trim_start_matches('\\').split('\\');
    while let Some(key) = parts.next() {
        if key.is_empty() {
            continue;
        }
        let val = parts.next().unwrap_or_default();
        pairs.push((key.to_string(), val.to_string()));
    }

    for key in ["xcn", "cn"] {
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = tag.to_string(),
            None => pairs.push((key.to_string(), tag.to_string())),
        }
    }

    pairs
        .iter()
        .map(|(k, v)| format!("\\{}\\{}", k, v))
        .collect()
}

/// Current annotation per player
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    tags: HashMap<PlayerId, String>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an annotation; returns whether it changed
    pub fn set(&mut self, player: PlayerId, annotation: String) -> bool {
        match self.tags.insert(player, annotation.clone()) {
            Some(previous) => previous != annotation,
            None => true,
        }
    }

    pub fn get(&self, player: PlayerId) -> Option<&str> {
        self.tags.get(&player).map(String::as_str)
    }

    pub fn remove(&mut self, player: PlayerId) -> Option<String> {
        self.tags.remove(&player)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
