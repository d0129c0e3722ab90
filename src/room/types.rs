use serde::{Deserialize, Serialize};

/// Request payload for creating a new room; the creator becomes host
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

/// Request payload for joining a room
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub name: String,
}

/// Request payload for leaving a room.
/// A leaving host may name their successor.
#[derive(Debug, Default, Deserialize)]
pub struct LeaveRoomRequest {
    #[serde(default)]
    pub new_host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub suspect_id: String,
}

/// Returned after creating or joining a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRoom {
    pub room_code: String,
    pub player_id: String,
    /// Where the client should go next
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// Confirmation handed back to the voter only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub suspect_id: String,
    pub suspect_name: String,
    pub vote_round: u32,
}
