use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use tracing::debug;

use crate::shared::AppError;

pub const SESSION_COOKIE: &str = "player_id";
pub const SESSION_HEADER: &str = "x-player-id";

/// The caller's opaque player id, if the request carried one.
///
/// Read from the `x-player-id` header first, then the `player_id` cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession(pub Option<String>);

/// Like `PlayerSession`, but the request is rejected without an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSession(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for PlayerSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_id(&parts.headers)))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequiredSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_id(&parts.headers).map(Self).ok_or_else(|| {
            debug!(uri = %parts.uri, "Request without player session");
            AppError::Unauthorized("Missing player session".to_string())
        })
    }
}

/// Extracts a usable player id from request headers
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| is_valid_id(id))
        .map(str::to_string);

    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && is_valid_id(value))
            .map(|(_, value)| value.to_string())
    })
}

/// `Set-Cookie` value that pins the player id to the browser
pub fn session_cookie(player_id: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, player_id
    )
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
