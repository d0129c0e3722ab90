use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::events::{RoomEventKind, RoomMessage};

/// Renders a payload for one subscriber, given that subscriber's player id
pub type Render = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A notification decided while the room lock was held
pub enum Notice {
    /// Same message to every subscriber
    All(RoomMessage),
    /// A payload rendered per subscriber
    Personalized { event: RoomEventKind, render: Render },
    /// Only to subscriptions registered under one player
    ToPlayer {
        player_id: String,
        message: RoomMessage,
    },
    /// Broadcast later, provided the room still exists and no game was dealt
    /// since `epoch` was read
    After {
        delay: Duration,
        epoch: u64,
        message: RoomMessage,
    },
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::All(message) => f.debug_tuple("All").field(message).finish(),
            Notice::Personalized { event, .. } => f
                .debug_struct("Personalized")
                .field("event", event)
                .finish_non_exhaustive(),
            Notice::ToPlayer { player_id, message } => f
                .debug_struct("ToPlayer")
                .field("player_id", player_id)
                .field("message", message)
                .finish(),
            Notice::After {
                delay,
                epoch,
                message,
            } => f
                .debug_struct("After")
                .field("delay", delay)
                .field("epoch", epoch)
                .field("message", message)
                .finish(),
        }
    }
}

/// Ordered notifications produced by one room mutation.
///
/// Everything in here is rendered from state captured under the lock, so
/// delivering it later never needs to look at the room again.
#[derive(Debug, Default)]
pub struct Outbox {
    notices: Vec<Notice>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&mut self, event: RoomEventKind, data: impl Into<String>) -> &mut Self {
        self.notices.push(Notice::All(RoomMessage::new(event, data)));
        self
    }

    pub fn personalized<F>(&mut self, event: RoomEventKind, render: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.notices.push(Notice::Personalized {
            event,
            render: Arc::new(render),
        });
        self
    }

    pub fn to_player(
        &mut self,
        player_id: impl Into<String>,
        event: RoomEventKind,
        data: impl Into<String>,
    ) -> &mut Self {
        self.notices.push(Notice::ToPlayer {
            player_id: player_id.into(),
            message: RoomMessage::new(event, data),
        });
        self
    }

    pub fn after(
        &mut self,
        delay: Duration,
        epoch: u64,
        event: RoomEventKind,
        data: impl Into<String>,
    ) -> &mut Self {
        self.notices.push(Notice::After {
            delay,
            epoch,
            message: RoomMessage::new(event, data),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn into_notices(self) -> Vec<Notice> {
        self.notices
    }
}
