// Library crate for the suspect party game server
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod event;
pub mod game;
pub mod realtime;
pub mod room;
pub mod session;
pub mod shared;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Re-export commonly used types for easier access in tests
pub use config::{RoomSettings, ServerConfig};
pub use event::{Broadcaster, RoomEventKind, RoomMessage};
pub use game::{Catalog, Game, Phase};
pub use room::{models::Room, repository::InMemoryRoomRepository, repository::RoomRepository, RoomService};
pub use shared::{AppError, AppState};

/// Every route of the game server
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", post(room::create_room))
        .route("/rooms/:code", get(room::get_lobby))
        .route("/rooms/:code/join", post(room::join_room))
        .route("/rooms/:code/start", post(room::start_game))
        .route("/rooms/:code/restart", post(room::restart_game))
        .route("/rooms/:code/close", post(room::close_room))
        .route("/rooms/:code/leave", post(room::leave_room))
        .route("/rooms/:code/ready", post(room::toggle_ready))
        .route("/rooms/:code/vote", post(room::cast_vote))
        .route("/rooms/:code/game", get(room::get_game))
        .route("/rooms/:code/results", get(room::get_results))
        .route("/rooms/:code/host-candidates", get(room::host_candidates))
        .route("/rooms/:code/events", get(realtime::room_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness plus the number of open rooms
async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let rooms = state.room_repository.count().await?;
    Ok(Json(json!({ "status": "ok", "rooms": rooms })))
}
