use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::Room;
use crate::shared::AppError;

/// Registry of live rooms, keyed by room code
///
/// The registry lock is only held for the lookup or update itself; room state
/// has its own lock inside `Room`.
#[async_trait]
pub trait RoomRepository {
    async fn get(&self, code: &str) -> Result<Option<Arc<Room>>, AppError>;
    async fn set(&self, code: &str, room: Arc<Room>) -> Result<(), AppError>;
    /// Returns true if a room was removed
    async fn delete(&self, code: &str) -> Result<bool, AppError>;
    async fn exists(&self, code: &str) -> Result<bool, AppError>;

    /// Atomically stores the room unless its code is already taken.
    /// Returns false when the code was taken.
    async fn insert_if_absent(&self, room: Arc<Room>) -> Result<bool, AppError>;

    async fn count(&self) -> Result<usize, AppError>;
}

/// In-memory implementation of RoomRepository
pub struct InMemoryRoomRepository {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Default for InMemoryRoomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    #[instrument(skip(self))]
    async fn get(&self, code: &str) -> Result<Option<Arc<Room>>, AppError> {
        let room = self.rooms.read().await.get(code).cloned();
        if room.is_none() {
            debug!(room_code = %code, "Room not found in memory");
        }
        Ok(room)
    }

    #[instrument(skip(self, room))]
    async fn set(&self, code: &str, room: Arc<Room>) -> Result<(), AppError> {
        self.rooms.write().await.insert(code.to_string(), room);
        debug!(room_code = %code, "Room stored in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, code: &str) -> Result<bool, AppError> {
        let removed = self.rooms.write().await.remove(code).is_some();
        debug!(room_code = %code, removed, "Room deleted from memory");
        Ok(removed)
    }

    async fn exists(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.rooms.read().await.contains_key(code))
    }

    #[instrument(skip(self, room), fields(room_code = %room.code()))]
    async fn insert_if_absent(&self, room: Arc<Room>) -> Result<bool, AppError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room.code()) {
            debug!("Room code already taken");
            return Ok(false);
        }
        rooms.insert(room.code().to_string(), room);
        Ok(true)
    }

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.rooms.read().await.len())
    }
}
