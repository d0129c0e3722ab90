use tokio::time::{sleep, Duration};

use suspect::{realtime::Subscription, room::views::GameView, Phase};

use super::setup::TestSetup;

// ============================================================================
// Action Helpers
// ============================================================================

impl TestSetup {
    pub async fn subscribe(&self, name: &str) -> Subscription {
        self.service()
            .subscribe(&self.code, &self.id(name))
            .await
            .unwrap()
    }

    pub async fn start(&self) {
        self.service()
            .start_game(&self.code, &self.id(&self.host()))
            .await
            .unwrap();
    }

    pub async fn ready(&self, name: &str) -> bool {
        self.service()
            .toggle_ready(&self.code, &self.id(name))
            .await
            .unwrap()
    }

    /// Marks every listed player ready in the current phase
    pub async fn ready_all(&self, names: &[&str]) {
        for name in names {
            assert!(self.ready(name).await, "{} should now be ready", name);
        }
    }

    pub async fn vote(&self, voter: &str, suspect: &str) {
        self.service()
            .cast_vote(&self.code, &self.id(voter), &self.id(suspect))
            .await
            .unwrap();
    }

    pub async fn leave(&self, name: &str) {
        self.service()
            .leave_room(&self.code, &self.id(name), None)
            .await
            .unwrap();
    }

    pub async fn game_view(&self, name: &str) -> GameView {
        self.service()
            .game_view(&self.code, &self.id(name))
            .await
            .unwrap()
    }

    pub async fn phase(&self) -> Option<Phase> {
        let room = self.service().find(&self.code).await.ok()?;
        let state = room.read().await;
        state.game.as_ref().map(|g| g.phase())
    }

    /// Display name of the dealt spy
    pub async fn spy(&self) -> String {
        for name in self.names() {
            if self.game_view(&name).await.is_spy {
                return name;
            }
        }
        panic!("no spy was dealt");
    }

    /// Everyone in the room except `name`
    pub fn others(&self, name: &str) -> Vec<String> {
        self.names().into_iter().filter(|n| n != name).collect()
    }

    /// Starts a game and walks it through the ready check and role reveal
    pub async fn start_and_reach_playing(&self) {
        self.start().await;
        let names = self.names();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.ready_all(&names).await;
        assert_eq!(self.phase().await, Some(Phase::RoleReveal));
        self.ready_all(&names).await;
        assert_eq!(self.phase().await, Some(Phase::Playing));
    }

    /// Continues from Playing into Voting with everyone ready
    pub async fn reach_voting(&self) {
        let names = self.names();
        for name in &names {
            if self.phase().await != Some(Phase::Playing) {
                break;
            }
            self.ready(name).await;
        }
        assert_eq!(self.phase().await, Some(Phase::Voting));
    }

    /// Gives deferred notices and spawned cleanups a moment to run
    pub async fn settle(&self, millis: u64) {
        sleep(Duration::from_millis(millis)).await;
    }
}
