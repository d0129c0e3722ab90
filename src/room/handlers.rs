use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument};

use super::{
    types::{
        CreateRoomRequest, JoinRoomRequest, JoinedRoom, LeaveRoomRequest, ReadyResponse,
        VoteReceipt, VoteRequest,
    },
    views::{GameView, LobbyView, PlayerEntry, ResultsView},
};
use crate::session::{session_cookie, PlayerSession, RequiredSession};
use crate::shared::{AppError, AppState};

fn with_session_cookie(joined: JoinedRoom) -> impl IntoResponse {
    let cookie = session_cookie(&joined.player_id);
    ([(header::SET_COOKIE, cookie)], Json(joined))
}

/// HTTP handler for creating a new room
///
/// POST /rooms
/// The creator becomes host; the response pins their player id in a cookie
#[instrument(name = "create_room", skip(state, request))]
pub async fn create_room(
    State(state): State<AppState>,
    PlayerSession(session): PlayerSession,
    Json(request): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, AppError> {
    let joined = state
        .room_service
        .create_room(&request.name, session)
        .await?;

    info!(room_code = %joined.room_code, "Room created via HTTP");
    Ok(with_session_cookie(joined))
}

/// POST /rooms/:code/join
#[instrument(name = "join_room", skip(state, request))]
pub async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    PlayerSession(session): PlayerSession,
    Json(request): Json<JoinRoomRequest>,
) -> Result<impl IntoResponse, AppError> {
    let joined = state
        .room_service
        .join_room(&code, &request.name, session)
        .await?;

    Ok(with_session_cookie(joined))
}

/// GET /rooms/:code
#[instrument(name = "get_lobby", skip(state))]
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Json<LobbyView>, AppError> {
    let view = state.room_service.lobby_view(&code, &player_id).await?;
    Ok(Json(view))
}

/// POST /rooms/:code/start
#[instrument(name = "start_game", skip(state))]
pub async fn start_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<StatusCode, AppError> {
    state.room_service.start_game(&code, &player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rooms/:code/restart
#[instrument(name = "restart_game", skip(state))]
pub async fn restart_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<StatusCode, AppError> {
    state.room_service.restart_game(&code, &player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rooms/:code/close
#[instrument(name = "close_room", skip(state))]
pub async fn close_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<StatusCode, AppError> {
    state.room_service.close_room(&code, &player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rooms/:code/leave
///
/// The body is optional; a leaving host may send `{"new_host_id": "..."}`
#[instrument(name = "leave_room", skip(state, request))]
pub async fn leave_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
    request: Option<Json<LeaveRoomRequest>>,
) -> Result<StatusCode, AppError> {
    let Json(request) = request.unwrap_or_default();
    state
        .room_service
        .leave_room(&code, &player_id, request.new_host_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rooms/:code/ready
#[instrument(name = "toggle_ready", skip(state))]
pub async fn toggle_ready(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Json<ReadyResponse>, AppError> {
    let ready = state.room_service.toggle_ready(&code, &player_id).await?;
    Ok(Json(ReadyResponse { ready }))
}

/// POST /rooms/:code/vote
#[instrument(name = "cast_vote", skip(state, request))]
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteReceipt>, AppError> {
    let receipt = state
        .room_service
        .cast_vote(&code, &player_id, &request.suspect_id)
        .await?;
    Ok(Json(receipt))
}

/// GET /rooms/:code/game
#[instrument(name = "get_game", skip(state))]
pub async fn get_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Json<GameView>, AppError> {
    let view = state.room_service.game_view(&code, &player_id).await?;
    Ok(Json(view))
}

/// GET /rooms/:code/results
#[instrument(name = "get_results", skip(state))]
pub async fn get_results(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Json<ResultsView>, AppError> {
    let view = state.room_service.results_view(&code, &player_id).await?;
    Ok(Json(view))
}

/// GET /rooms/:code/host-candidates
#[instrument(name = "host_candidates", skip(state))]
pub async fn host_candidates(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Json<Vec<PlayerEntry>>, AppError> {
    let candidates = state
        .room_service
        .host_candidates(&code, &player_id)
        .await?;
    Ok(Json(candidates))
}
