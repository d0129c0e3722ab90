use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::events::{RoomEventKind, RoomMessage};
use super::outbox::{Notice, Outbox, Render};
use crate::room::models::{Room, Subscriber};
use crate::room::repository::RoomRepository;

/// Delivers room messages to subscriber mailboxes.
///
/// Every send is bounded by `send_timeout`; a subscriber whose mailbox stays
/// full for that long misses the message and delivery moves on. Callers must
/// never hold the room lock while calling into the broadcaster: the subscriber
/// list is snapshotted under a short read lock and sent to without any lock.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    /// Sends one message per subscriber and returns how many were delivered
    pub async fn deliver<F>(&self, room_code: &str, subscribers: &[Subscriber], mut message_for: F) -> usize
    where
        F: FnMut(&Subscriber) -> RoomMessage,
    {
        let mut delivered = 0;

        for subscriber in subscribers {
            let message = message_for(subscriber);
            let event = message.event;

            match timeout(self.send_timeout, subscriber.sender.send(message)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) => {
                    debug!(
                        room_code = %room_code,
                        subscriber_id = subscriber.id,
                        "Subscriber mailbox closed, skipping"
                    );
                }
                Err(_) => {
                    warn!(
                        room_code = %room_code,
                        subscriber_id = subscriber.id,
                        player_id = %subscriber.player_id,
                        event = %event,
                        "Subscriber did not accept message in time, skipping"
                    );
                }
            }
        }

        delivered
    }

    /// Same message to every current subscriber
    #[instrument(skip(self, room, message), fields(room_code = %room.code(), event = %message.event))]
    pub async fn broadcast(&self, room: &Room, message: RoomMessage) -> usize {
        let subscribers = room.subscribers().await;
        let delivered = self
            .deliver(room.code(), &subscribers, |_| message.clone())
            .await;

        debug!(delivered, subscribers = subscribers.len(), "Broadcast complete");
        delivered
    }

    /// A separately rendered payload for each subscriber
    #[instrument(skip(self, room, render), fields(room_code = %room.code()))]
    pub async fn broadcast_personalized(
        &self,
        room: &Room,
        event: RoomEventKind,
        render: &Render,
    ) -> usize {
        let subscribers = room.subscribers().await;
        self.deliver(room.code(), &subscribers, |subscriber| {
            RoomMessage::new(event, render(&subscriber.player_id))
        })
        .await
    }

    /// Only the subscriptions registered under `player_id`
    #[instrument(skip(self, room, message), fields(room_code = %room.code(), event = %message.event))]
    pub async fn broadcast_to_player(
        &self,
        room: &Room,
        player_id: &str,
        message: RoomMessage,
    ) -> usize {
        let subscribers: Vec<Subscriber> = room
            .subscribers()
            .await
            .into_iter()
            .filter(|subscriber| subscriber.player_id == player_id)
            .collect();

        self.deliver(room.code(), &subscribers, |_| message.clone())
            .await
    }

    /// Delivers everything a mutation queued, in order
    pub async fn flush(
        &self,
        room: &Arc<Room>,
        repository: &Arc<dyn RoomRepository + Send + Sync>,
        outbox: Outbox,
    ) {
        for notice in outbox.into_notices() {
            match notice {
                Notice::All(message) => {
                    self.broadcast(room, message).await;
                }
                Notice::Personalized { event, render } => {
                    self.broadcast_personalized(room, event, &render).await;
                }
                Notice::ToPlayer { player_id, message } => {
                    self.broadcast_to_player(room, &player_id, message).await;
                }
                Notice::After {
                    delay,
                    epoch,
                    message,
                } => {
                    self.schedule(Arc::clone(room), Arc::clone(repository), delay, epoch, message);
                }
            }
        }
    }

    /// Broadcasts after `delay`, but only if the registry still maps the room's
    /// code to this same room and no game was dealt since `epoch`. A closed or
    /// replaced room gets nothing, and neither does a room that moved on to a
    /// new game.
    pub fn schedule(
        &self,
        room: Arc<Room>,
        repository: Arc<dyn RoomRepository + Send + Sync>,
        delay: Duration,
        epoch: u64,
        message: RoomMessage,
    ) -> JoinHandle<()> {
        let broadcaster = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match repository.get(room.code()).await {
                Ok(Some(current)) if Arc::ptr_eq(&current, &room) => {}
                Ok(_) => {
                    debug!(room_code = %room.code(), "Room gone before deferred broadcast, dropping it");
                    return;
                }
                Err(e) => {
                    warn!(room_code = %room.code(), error = %e, "Failed to look up room for deferred broadcast");
                    return;
                }
            }

            let games_dealt = room.read().await.games_dealt;
            if games_dealt != epoch {
                debug!(
                    room_code = %room.code(),
                    epoch,
                    games_dealt,
                    "New game dealt before deferred broadcast, dropping it"
                );
                return;
            }

            broadcaster.broadcast(&room, message).await;
        })
    }
}
