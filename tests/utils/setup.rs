use std::sync::Arc;
use std::time::Duration;

use suspect::{
    room::repository::RoomRepository, AppState, Catalog, InMemoryRoomRepository, RoomService,
    RoomSettings,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub state: AppState,
    pub repository: Arc<InMemoryRoomRepository>,
    pub code: String,
    /// (name, player id) in join order; the first entry is the host
    pub players: Vec<(String, String)>,
}

pub struct TestSetupBuilder {
    players: Vec<String>,
    settings: RoomSettings,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            players: vec![],
            settings: RoomSettings {
                broadcast_timeout: Duration::from_millis(100),
                subscriber_buffer: 256,
                abort_redirect_delay: Duration::from_millis(30),
                disconnect_grace: Duration::from_millis(30),
            },
        }
    }

    pub fn with_players(mut self, players: Vec<&str>) -> Self {
        self.players = players.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_three_players(self) -> Self {
        self.with_players(vec!["alice", "bob", "carol"])
    }

    pub fn with_four_players(self) -> Self {
        self.with_players(vec!["alice", "bob", "carol", "dave"])
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.settings.disconnect_grace = grace;
        self
    }

    pub async fn build(self) -> TestSetup {
        let repository = Arc::new(InMemoryRoomRepository::new());
        let state = AppState::new(
            repository.clone() as Arc<dyn RoomRepository + Send + Sync>,
            Catalog::default(),
            self.settings,
        );

        let mut names = self.players.into_iter();
        let host = names.next().unwrap_or_else(|| "host".to_string());
        let host_id = format!("p-{}", host);

        let created = state
            .room_service
            .create_room(&host, Some(host_id.clone()))
            .await
            .unwrap();
        let mut players = vec![(host, host_id)];

        for name in names {
            let id = format!("p-{}", name);
            state
                .room_service
                .join_room(&created.room_code, &name, Some(id.clone()))
                .await
                .unwrap();
            players.push((name, id));
        }

        TestSetup {
            state,
            repository,
            code: created.room_code,
            players,
        }
    }
}

impl TestSetup {
    pub fn service(&self) -> &Arc<RoomService> {
        &self.state.room_service
    }

    /// Player id for a display name
    pub fn id(&self, name: &str) -> String {
        self.players
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| id.clone())
            .unwrap_or_else(|| panic!("no player named {}", name))
    }

    pub fn host(&self) -> String {
        self.players[0].0.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.players.iter().map(|(n, _)| n.clone()).collect()
    }
}
