// Snapshots of room state for clients. Everything here reads `RoomState` and
// must be called while the caller holds the room lock (shared or exclusive).
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

use super::models::RoomState;
use crate::event::{RoomEventKind, RoomMessage};
use crate::game::{Location, Phase, PlayerId, MIN_PLAYERS};

pub fn lobby_path(code: &str) -> String {
    format!("/lobby/{}", code)
}

/// Where a member of this room should currently be
pub fn current_path(state: &RoomState) -> String {
    match &state.game {
        Some(game) => game.phase().path(&state.code),
        None => lobby_path(&state.code),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreEntry {
    pub id: PlayerId,
    pub name: String,
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub is_host: bool,
    pub player_count: usize,
    pub in_game: bool,
    pub can_start: bool,
}

/// The parts of room state that lobby controls depend on
#[derive(Debug, Clone)]
pub struct ControlsSnapshot {
    host_id: PlayerId,
    player_count: usize,
    in_game: bool,
}

impl ControlsSnapshot {
    pub fn capture(state: &RoomState) -> Self {
        Self {
            host_id: state.host_id.clone(),
            player_count: state.members.len(),
            in_game: state.has_active_game(),
        }
    }

    pub fn for_viewer(&self, viewer: &str) -> Controls {
        let is_host = self.host_id == viewer;
        Controls {
            is_host,
            player_count: self.player_count,
            in_game: self.in_game,
            can_start: is_host && !self.in_game && self.player_count >= MIN_PLAYERS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyView {
    pub code: String,
    pub host_id: PlayerId,
    pub players: Vec<PlayerEntry>,
    pub scores: Vec<ScoreEntry>,
    pub controls: Controls,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub code: String,
    pub phase: Phase,
    pub players: Vec<PlayerEntry>,
    pub challenge: Option<String>,
    pub is_spy: bool,
    /// Hidden from the spy
    pub location: Option<Location>,
    pub is_ready: bool,
    pub ready_count: usize,
    pub has_voted: bool,
    pub votes_cast: usize,
    pub total: usize,
    pub vote_round: u32,
    pub first_questioner: Option<PlayerEntry>,
    pub play_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsView {
    pub code: String,
    pub spy_id: PlayerId,
    pub spy_name: String,
    pub location: Location,
    pub challenges: HashMap<PlayerId, String>,
    pub votes: HashMap<PlayerId, PlayerId>,
    pub vote_counts: HashMap<PlayerId, usize>,
    pub voted_correctly: HashMap<PlayerId, bool>,
    pub vote_rounds: u32,
    pub accused: Option<PlayerId>,
    pub tied: bool,
    pub innocents_won: bool,
    pub spy_forfeited: bool,
    pub players: Vec<PlayerEntry>,
    pub scores: Vec<ScoreEntry>,
}

/// Members sorted by display name, ignoring case
pub fn players(state: &RoomState) -> Vec<PlayerEntry> {
    let mut players: Vec<PlayerEntry> = state
        .members
        .values()
        .map(|m| PlayerEntry {
            id: m.id.clone(),
            name: m.name.clone(),
            is_host: state.is_host(&m.id),
        })
        .collect();
    players.sort_by_key(|p| p.name.to_lowercase());
    players
}

/// Score table, most wins first
pub fn scores(state: &RoomState) -> Vec<ScoreEntry> {
    let mut scores: Vec<ScoreEntry> = state
        .members
        .values()
        .map(|m| {
            let score = state.scores.get(&m.id).copied().unwrap_or_default();
            ScoreEntry {
                id: m.id.clone(),
                name: m.name.clone(),
                wins: score.wins,
                losses: score.losses,
            }
        })
        .collect();
    scores.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    scores
}

pub fn lobby_view(state: &RoomState, viewer: &str) -> LobbyView {
    LobbyView {
        code: state.code.clone(),
        host_id: state.host_id.clone(),
        players: players(state),
        scores: scores(state),
        controls: ControlsSnapshot::capture(state).for_viewer(viewer),
        path: current_path(state),
    }
}

pub fn game_view(state: &RoomState, viewer: &str) -> Option<GameView> {
    let game = state.game.as_ref()?;
    let ids = state.member_ids();
    let info = game.player_info(viewer);
    let is_spy = info.map(|i| i.is_spy).unwrap_or(false);

    let first_questioner = game.first_questioner().and_then(|id| {
        state.members.get(id).map(|m| PlayerEntry {
            id: m.id.clone(),
            name: m.name.clone(),
            is_host: state.is_host(&m.id),
        })
    });

    Some(GameView {
        code: state.code.clone(),
        phase: game.phase(),
        players: players(state),
        challenge: info.map(|i| i.challenge.clone()),
        is_spy,
        location: (!is_spy).then(|| game.location().clone()),
        is_ready: game.is_ready(viewer),
        ready_count: game.ready_count(&ids),
        has_voted: game.has_voted(viewer),
        votes_cast: game.vote_count(&ids),
        total: ids.len(),
        vote_round: game.vote_round(),
        first_questioner,
        play_started_at: game.play_started_at(),
    })
}

/// Only available once the game has finished
pub fn results_view(state: &RoomState) -> Option<ResultsView> {
    let game = state.game.as_ref()?;
    let outcome = game.outcome()?;

    let voted_correctly = game
        .votes()
        .iter()
        .map(|(voter, suspect)| (voter.clone(), suspect == game.spy_id()))
        .collect();

    Some(ResultsView {
        code: state.code.clone(),
        spy_id: game.spy_id().to_string(),
        spy_name: game.spy_name().to_string(),
        location: game.location().clone(),
        challenges: game.challenges(),
        votes: game.votes().clone(),
        vote_counts: outcome.vote_counts.clone(),
        voted_correctly,
        vote_rounds: game.vote_round(),
        accused: outcome.accused.clone(),
        tied: outcome.tied,
        innocents_won: outcome.innocents_won,
        spy_forfeited: outcome.spy_forfeited,
        players: players(state),
        scores: scores(state),
    })
}

pub fn player_update(state: &RoomState) -> String {
    json!({ "players": players(state) }).to_string()
}

pub fn score_update(state: &RoomState) -> String {
    json!({ "scores": scores(state) }).to_string()
}

pub fn controls_update(snapshot: &ControlsSnapshot, viewer: &str) -> String {
    json!(snapshot.for_viewer(viewer)).to_string()
}

pub fn nav_redirect(path: &str) -> String {
    json!({ "path": path }).to_string()
}

pub fn message(text: &str) -> String {
    json!({ "message": text }).to_string()
}

pub fn host_changed(state: &RoomState) -> String {
    json!({
        "host_id": state.host_id,
        "host_name": state.member_name(&state.host_id),
    })
    .to_string()
}

/// The count event for the current phase: readiness in the ready phases,
/// votes while voting, nothing once the game is over
pub fn phase_count(state: &RoomState) -> Option<RoomMessage> {
    let game = state.game.as_ref()?;
    let ids = state.member_ids();

    if let Some(event) = RoomEventKind::ready_count(game.phase()) {
        let data = json!({ "ready": game.ready_count(&ids), "total": ids.len() });
        return Some(RoomMessage::new(event, data.to_string()));
    }

    (game.phase() == Phase::Voting).then(|| {
        let data = json!({
            "voted": game.vote_count(&ids),
            "total": ids.len(),
            "round": game.vote_round(),
        });
        RoomMessage::new(RoomEventKind::VoteCountVoting, data.to_string())
    })
}

/// What a new subscriber gets before any live updates
pub fn initial_messages(state: &RoomState, viewer: &str) -> Vec<RoomMessage> {
    if state.has_active_game() {
        return phase_count(state).into_iter().collect();
    }

    let controls = ControlsSnapshot::capture(state);
    vec![
        RoomMessage::new(RoomEventKind::PlayerUpdate, player_update(state)),
        RoomMessage::new(
            RoomEventKind::ControlsUpdate,
            controls_update(&controls, viewer),
        ),
        RoomMessage::new(RoomEventKind::ScoreUpdate, score_update(state)),
    ]
}
