use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::session::RequiredSession;
use crate::shared::{AppError, AppState};

/// Server-sent event stream for one member of a room
///
/// GET /rooms/:code/events
/// Each event is named after its kind (`nav-redirect`, `player-update`, ...)
/// and carries a JSON payload.
#[instrument(name = "room_events", skip(state))]
pub async fn room_events(
    State(state): State<AppState>,
    Path(code): Path<String>,
    RequiredSession(player_id): RequiredSession,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.room_service.subscribe(&code, &player_id).await?;
    info!(
        room_code = %subscription.room.code(),
        subscriber_id = subscription.subscriber_id,
        "Real-time stream opened"
    );

    let stream = subscription
        .into_stream(Arc::clone(&state.room_service))
        .map(|message| Ok(Event::default().event(message.event.as_ref()).data(message.data)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
