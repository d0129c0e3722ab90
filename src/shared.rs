use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RoomSettings;
use crate::event::Broadcaster;
use crate::game::{Catalog, GameError};
use crate::room::repository::RoomRepository;
use crate::room::RoomService;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub room_repository: Arc<dyn RoomRepository + Send + Sync>,
    pub room_service: Arc<RoomService>,
}

impl AppState {
    pub fn new(
        room_repository: Arc<dyn RoomRepository + Send + Sync>,
        catalog: Catalog,
        settings: RoomSettings,
    ) -> Self {
        let broadcaster = Broadcaster::new(settings.broadcast_timeout);
        let room_service = Arc::new(RoomService::new(
            Arc::clone(&room_repository),
            broadcaster,
            Arc::new(catalog),
            settings,
        ));

        Self {
            room_repository,
            room_service,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal,
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::UnknownSuspect(_) => AppError::NotFound(err.to_string()),
            GameError::NotParticipant(_) => AppError::Forbidden(err.to_string()),
            GameError::NotEnoughPlayers(_) | GameError::NotReadyPhase(_) | GameError::NotVoting => {
                AppError::PreconditionFailed(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::PreconditionFailed(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
