//! Playback-related type definitions

use serde::{Deserialize, Serialize};

/// Playback state enumeration
///
/// Transitions: `Stopped → Connecting → Playing ⇄ Paused`, and any state
/// back to `Stopped` on a hard reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Output device is being acquired
    Connecting,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Whether a transition from `self` to `next` is part of the state machine
    ///
    /// Self-transitions are not transitions and return false.
    pub fn can_transition_to(&self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (_, Stopped) => *self != Stopped,
            (Stopped, Connecting) => true,
            (Connecting, Playing) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Connecting => write!(f, "connecting"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}
