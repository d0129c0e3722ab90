use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::RoomMessage;
use crate::game::PlayerId;
use crate::room::models::Room;
use crate::room::RoomService;

/// A registered subscriber: its snapshot messages plus its live mailbox
#[derive(Debug)]
pub struct Subscription {
    pub room: Arc<Room>,
    pub subscriber_id: u64,
    pub player_id: PlayerId,
    /// Sent before anything from the mailbox
    pub initial: Vec<RoomMessage>,
    pub receiver: mpsc::Receiver<RoomMessage>,
}

impl Subscription {
    /// Initial messages, then live messages until the mailbox closes.
    ///
    /// Dropping the stream (client went away) or reaching its end (room closed,
    /// player left) unregisters the subscriber exactly once.
    pub fn into_stream(self, service: Arc<RoomService>) -> impl Stream<Item = RoomMessage> + Send {
        let guard = SubscriptionGuard {
            service,
            room: Some(self.room),
            subscriber_id: self.subscriber_id,
        };

        let live = stream::unfold((self.receiver, guard), |(mut receiver, guard)| async move {
            receiver
                .recv()
                .await
                .map(|message| (message, (receiver, guard)))
        });

        stream::iter(self.initial).chain(live)
    }
}

struct SubscriptionGuard {
    service: Arc<RoomService>,
    room: Option<Arc<Room>>,
    subscriber_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        let service = Arc::clone(&self.service);
        let subscriber_id = self.subscriber_id;

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    service.end_subscription(&room, subscriber_id).await;
                });
            }
            Err(_) => {
                debug!(room_code = %room.code(), subscriber_id, "Runtime gone, skipping subscriber cleanup");
            }
        }
    }
}
