use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::game::Phase;

/// Named real-time events pushed to a room's subscribers
///
/// The name is what clients listen for; the payload is an opaque JSON
/// document rendered from room state at the moment the event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RoomEventKind {
    /// Tells clients to navigate (new phase, lobby, results or home)
    NavRedirect,
    /// Membership changed
    PlayerUpdate,
    /// Score table changed
    ScoreUpdate,
    /// Per-viewer lobby controls changed
    ControlsUpdate,
    ReadyCountCheck,
    ReadyCountReveal,
    ReadyCountPlaying,
    VoteCountVoting,
    /// Sent only to the player who just became host
    HostChanged,
    /// Transient warning shown to everyone
    ErrorMessage,
}

impl RoomEventKind {
    /// The ready-count event belonging to a phase, if the phase tracks readiness
    pub fn ready_count(phase: Phase) -> Option<Self> {
        match phase {
            Phase::ReadyCheck => Some(Self::ReadyCountCheck),
            Phase::RoleReveal => Some(Self::ReadyCountReveal),
            Phase::Playing => Some(Self::ReadyCountPlaying),
            Phase::Voting | Phase::Finished => None,
        }
    }
}

/// One message in a subscriber's mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomMessage {
    pub event: RoomEventKind,
    pub data: String,
}

impl RoomMessage {
    pub fn new(event: RoomEventKind, data: impl Into<String>) -> Self {
        Self {
            event,
            data: data.into(),
        }
    }
}
