use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display};

pub type PlayerId = String;

/// Phases of a single game, in the order they are played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    ReadyCheck,
    RoleReveal,
    Playing,
    Voting,
    Finished,
}

impl Phase {
    /// Navigation target for clients that should be looking at this phase
    pub fn path(&self, room_code: &str) -> String {
        match self {
            Phase::ReadyCheck => format!("/game/{}/confirm-reveal", room_code),
            Phase::RoleReveal => format!("/game/{}/roles", room_code),
            Phase::Playing => format!("/game/{}/play", room_code),
            Phase::Voting => format!("/game/{}/voting", room_code),
            Phase::Finished => format!("/results/{}", room_code),
        }
    }
}

/// The shared secret every non-spy player knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub word: String,
    pub categories: Vec<String>,
}

/// Per-player game data, fixed when the game is dealt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub challenge: String,
    pub is_spy: bool,
}

/// How a finished game was adjudicated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub innocents_won: bool,
    /// The unique most-voted suspect, if there was one
    pub accused: Option<PlayerId>,
    /// True when the final round ended tied after the revote limit
    pub tied: bool,
    pub spy_forfeited: bool,
    pub vote_counts: HashMap<PlayerId, usize>,
}

impl Outcome {
    pub fn forfeit(spy_id: &str) -> Self {
        Self {
            innocents_won: true,
            accused: Some(spy_id.to_string()),
            tied: false,
            spy_forfeited: true,
            vote_counts: HashMap::new(),
        }
    }
}

/// Result of re-evaluating the advancement rule after a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Unchanged,
    Advanced { from: Phase, to: Phase },
    Revote { round: u32 },
    Finished(Outcome),
}

impl Progress {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Progress::Unchanged)
    }
}
