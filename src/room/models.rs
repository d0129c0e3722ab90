use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::event::RoomMessage;
use crate::game::{Game, Outcome, Phase, PlayerId, Progress, MIN_PLAYERS};

/// A player currently in the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: PlayerId,
    pub name: String,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Wins and losses accumulated across the games played in one room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub wins: u32,
    pub losses: u32,
}

/// A connected real-time listener and its bounded mailbox
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: u64,
    pub player_id: PlayerId,
    pub sender: mpsc::Sender<RoomMessage>,
}

/// What a departure did to the active game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameImpact {
    /// No game was running (or it had already finished)
    None,
    /// The spy left; the game ended in favour of everyone remaining
    SpyForfeited(Outcome),
    /// Too few players remained and the game was dropped without scoring
    Aborted,
    /// The advancement rule was re-run against the smaller member set
    Progressed(Progress),
}

/// Result of removing a member from a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Member,
    /// The room has no members left and must be deleted
    pub emptied: bool,
    /// Set when the departing player was host
    pub new_host: Option<PlayerId>,
    pub game: GameImpact,
}

/// Everything guarded by a room's lock
#[derive(Debug)]
pub struct RoomState {
    pub code: String,
    pub host_id: PlayerId,
    pub members: BTreeMap<PlayerId, Member>,
    pub scores: HashMap<PlayerId, Score>,
    pub game: Option<Game>,
    /// Set once the room is closed or emptied; a closed room accepts nothing
    pub closed: bool,
    /// Bumped every time a game is dealt
    pub games_dealt: u64,
    subscribers: BTreeMap<u64, Subscriber>,
    next_subscriber_id: u64,
}

impl RoomState {
    pub fn new(code: String, host: Member) -> Self {
        let mut state = Self {
            code,
            host_id: host.id.clone(),
            members: BTreeMap::new(),
            scores: HashMap::new(),
            game: None,
            closed: false,
            games_dealt: 0,
            subscribers: BTreeMap::new(),
            next_subscriber_id: 1,
        };
        state.add_member(host);
        state
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.keys().cloned().collect()
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.members.contains_key(player_id)
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_id == player_id
    }

    pub fn member_name(&self, player_id: &str) -> Option<&str> {
        self.members.get(player_id).map(|m| m.name.as_str())
    }

    /// Display names are unique per room, ignoring case
    pub fn name_taken(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.members.values().any(|m| m.name.to_lowercase() == wanted)
    }

    pub fn has_active_game(&self) -> bool {
        self.game.is_some()
    }

    /// Adds a member, creating their score entry on first join
    pub fn add_member(&mut self, member: Member) {
        self.scores.entry(member.id.clone()).or_default();
        self.members.insert(member.id.clone(), member);
    }

    /// Installs a freshly dealt game and bumps the epoch
    pub fn begin_game(&mut self, game: Game) {
        self.game = Some(game);
        self.games_dealt += 1;
    }

    /// Re-runs the advancement rule and settles scores if the game just finished
    pub fn advance_game<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Progress {
        let ids = self.member_ids();
        let progress = match self.game.as_mut() {
            Some(game) => game.advance(&ids, rng),
            None => Progress::Unchanged,
        };

        if let Progress::Finished(outcome) = &progress {
            self.settle(outcome);
        }
        progress
    }

    /// Credits every current member with a win or a loss.
    /// Players who already left have no score entry and are skipped.
    pub fn settle(&mut self, outcome: &Outcome) {
        let Some(spy_id) = self.game.as_ref().map(|g| g.spy_id().to_string()) else {
            return;
        };

        for id in self.members.keys() {
            let won = (*id == spy_id) != outcome.innocents_won;
            let score = self.scores.entry(id.clone()).or_default();
            if won {
                score.wins += 1;
            } else {
                score.losses += 1;
            }
        }

        debug!(
            room_code = %self.code,
            innocents_won = outcome.innocents_won,
            spy_forfeited = outcome.spy_forfeited,
            "Scores settled"
        );
    }

    /// Removes a member and reconciles host, subscriptions and game state.
    ///
    /// `requested_host` is honoured only when the departing player is host and
    /// the requested player is still a member; otherwise the lowest remaining
    /// player id becomes host. Returns `None` if the player was not a member.
    pub fn remove_member<R: Rng + ?Sized>(
        &mut self,
        player_id: &str,
        requested_host: Option<&str>,
        rng: &mut R,
    ) -> Option<Departure> {
        let player = self.members.remove(player_id)?;
        self.scores.remove(player_id);
        self.drop_subscriptions_for(player_id);

        if self.members.is_empty() {
            self.closed = true;
            self.game = None;
            return Some(Departure {
                player,
                emptied: true,
                new_host: None,
                game: GameImpact::None,
            });
        }

        let new_host = if self.host_id == player_id {
            let next = requested_host
                .filter(|id| self.members.contains_key(*id))
                .map(str::to_string)
                .or_else(|| self.members.keys().next().cloned());
            if let Some(host) = &next {
                self.host_id = host.clone();
            }
            next
        } else {
            None
        };

        let ids = self.member_ids();
        let impact = match self.game.as_mut() {
            Some(game) if game.phase() != Phase::Finished => {
                if game.remove_player(player_id) {
                    GameImpact::SpyForfeited(game.forfeit())
                } else if ids.len() < MIN_PLAYERS {
                    GameImpact::Aborted
                } else {
                    GameImpact::Progressed(game.advance(&ids, rng))
                }
            }
            _ => GameImpact::None,
        };

        match &impact {
            GameImpact::Aborted => self.game = None,
            GameImpact::SpyForfeited(outcome)
            | GameImpact::Progressed(Progress::Finished(outcome)) => self.settle(outcome),
            _ => {}
        }

        Some(Departure {
            player,
            emptied: false,
            new_host,
            game: impact,
        })
    }

    /// Registers a mailbox and returns its id plus how many other
    /// subscriptions the same player already had
    pub fn add_subscriber(
        &mut self,
        player_id: PlayerId,
        sender: mpsc::Sender<RoomMessage>,
    ) -> (u64, usize) {
        let existing = self.subscription_count(&player_id);
        if existing > 0 {
            warn!(
                room_code = %self.code,
                player_id = %player_id,
                existing,
                "Player opened an additional real-time subscription"
            );
        }
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                player_id,
                sender,
            },
        );
        (id, existing)
    }

    pub fn remove_subscriber(&mut self, subscriber_id: u64) -> Option<Subscriber> {
        self.subscribers.remove(&subscriber_id)
    }

    pub fn subscription_count(&self, player_id: &str) -> usize {
        self.subscribers
            .values()
            .filter(|s| s.player_id == player_id)
            .count()
    }

    pub fn subscribers(&self) -> Vec<Subscriber> {
        self.subscribers.values().cloned().collect()
    }

    /// Empties the subscriber set, returning what was registered.
    /// Mailboxes close once the returned senders are dropped.
    pub fn take_subscribers(&mut self) -> Vec<Subscriber> {
        std::mem::take(&mut self.subscribers).into_values().collect()
    }

    fn drop_subscriptions_for(&mut self, player_id: &str) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|_, s| s.player_id != player_id);
        before - self.subscribers.len()
    }
}

/// One room: its code plus the lock guarding all of its state
#[derive(Debug)]
pub struct Room {
    code: String,
    state: RwLock<RoomState>,
}

impl Room {
    pub fn new(code: String, host: Member) -> Self {
        Self {
            state: RwLock::new(RoomState::new(code.clone(), host)),
            code,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Shared access for rendering snapshots
    pub async fn read(&self) -> RwLockReadGuard<'_, RoomState> {
        self.state.read().await
    }

    /// Runs `f` under the exclusive lock. The guard is released before this
    /// returns, so whatever `f` produces can be broadcast without holding it.
    pub(crate) async fn transact<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut RoomState) -> T,
    {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    /// Copy of the current subscribers, taken under the shared lock
    pub async fn subscribers(&self) -> Vec<Subscriber> {
        self.state.read().await.subscribers()
    }

    #[cfg(test)]
    pub async fn subscribe(&self, player_id: PlayerId, sender: mpsc::Sender<RoomMessage>) -> u64 {
        let (id, _) = self.state.write().await.add_subscriber(player_id, sender);
        id
    }

    pub async fn unsubscribe(&self, subscriber_id: u64) -> Option<Subscriber> {
        self.state.write().await.remove_subscriber(subscriber_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Location, PlayerInfo};

    fn state_with(ids: &[&str]) -> RoomState {
        let mut state = RoomState::new("ABCDEF".to_string(), Member::new(ids[0], ids[0].to_uppercase()));
        for id in &ids[1..] {
            state.add_member(Member::new(*id, id.to_uppercase()));
        }
        state
    }

    fn start(state: &mut RoomState, spy: &str) {
        let player_info = state
            .member_ids()
            .into_iter()
            .map(|id| {
                let info = PlayerInfo {
                    challenge: "Hum a tune".to_string(),
                    is_spy: id == spy,
                };
                (id, info)
            })
            .collect();
        state.game = Some(Game::new(
            Location {
                word: "Museum".to_string(),
                categories: vec![],
            },
            spy.to_string(),
            spy.to_uppercase(),
            player_info,
        ));
    }

    fn ready_everyone(state: &mut RoomState) {
        let ids = state.member_ids();
        let game = state.game.as_mut().unwrap();
        for id in &ids {
            game.toggle_ready(id).unwrap();
        }
    }

    #[test]
    fn test_new_room_has_host_as_member() {
        let state = state_with(&["h"]);

        assert!(state.is_member("h"));
        assert!(state.is_host("h"));
        assert_eq!(state.scores.get("h"), Some(&Score::default()));
    }

    #[test]
    fn test_name_taken_ignores_case() {
        let mut state = state_with(&["h"]);
        state.add_member(Member::new("p2", "Alice"));

        assert!(state.name_taken("alice"));
        assert!(state.name_taken("ALICE"));
        assert!(!state.name_taken("Bob"));
    }

    #[test]
    fn test_host_leaving_reassigns_lowest_id() {
        let mut state = state_with(&["m", "c", "x"]);

        let departure = state.remove_member("m", None, &mut rand::rng()).unwrap();

        assert_eq!(departure.new_host.as_deref(), Some("c"));
        assert_eq!(state.host_id, "c");
        assert!(!state.scores.contains_key("m"));
    }

    #[test]
    fn test_host_leaving_with_requested_successor() {
        let mut state = state_with(&["a", "b", "c"]);

        let departure = state.remove_member("a", Some("c"), &mut rand::rng()).unwrap();
        assert_eq!(departure.new_host.as_deref(), Some("c"));

        // A successor that is not a member falls back to the lowest id
        let mut state = state_with(&["a", "b", "c"]);
        let departure = state.remove_member("a", Some("zzz"), &mut rand::rng()).unwrap();
        assert_eq!(departure.new_host.as_deref(), Some("b"));
    }

    #[test]
    fn test_non_host_leaving_keeps_host() {
        let mut state = state_with(&["a", "b", "c"]);

        let departure = state.remove_member("b", None, &mut rand::rng()).unwrap();

        assert_eq!(departure.new_host, None);
        assert_eq!(state.host_id, "a");
        assert_eq!(departure.game, GameImpact::None);
    }

    #[test]
    fn test_last_member_leaving_empties_room() {
        let mut state = state_with(&["a"]);

        let departure = state.remove_member("a", None, &mut rand::rng()).unwrap();

        assert!(departure.emptied);
        assert!(state.closed);
        assert!(state.members.is_empty());
    }

    #[test]
    fn test_unknown_player_is_not_a_departure() {
        let mut state = state_with(&["a", "b"]);
        assert!(state.remove_member("ghost", None, &mut rand::rng()).is_none());
    }

    #[test]
    fn test_spy_leaving_forfeits() {
        let mut state = state_with(&["a", "b", "c", "spy"]);
        start(&mut state, "spy");

        let departure = state.remove_member("spy", None, &mut rand::rng()).unwrap();

        match departure.game {
            GameImpact::SpyForfeited(outcome) => assert!(outcome.innocents_won),
            other => panic!("expected forfeit, got {:?}", other),
        }
        let game = state.game.as_ref().unwrap();
        assert_eq!(game.phase(), Phase::Finished);
        assert!(game.spy_forfeited());
        for id in ["a", "b", "c"] {
            assert_eq!(state.scores[id], Score { wins: 1, losses: 0 });
        }
    }

    #[test]
    fn test_falling_below_minimum_aborts() {
        let mut state = state_with(&["a", "b", "spy"]);
        start(&mut state, "spy");

        let departure = state.remove_member("b", None, &mut rand::rng()).unwrap();

        assert_eq!(departure.game, GameImpact::Aborted);
        assert!(state.game.is_none());
        assert_eq!(state.scores["a"], Score::default());
    }

    #[test]
    fn test_departure_can_advance_phase() {
        let mut state = state_with(&["a", "b", "c", "d"]);
        start(&mut state, "a");
        let game = state.game.as_mut().unwrap();
        for id in ["a", "b", "c"] {
            game.toggle_ready(id).unwrap();
        }

        let departure = state.remove_member("d", None, &mut rand::rng()).unwrap();

        assert_eq!(
            departure.game,
            GameImpact::Progressed(Progress::Advanced {
                from: Phase::ReadyCheck,
                to: Phase::RoleReveal
            })
        );
    }

    #[test]
    fn test_finished_game_is_left_alone() {
        let mut state = state_with(&["a", "b", "c", "spy"]);
        start(&mut state, "spy");
        state.game.as_mut().unwrap().forfeit();

        let departure = state.remove_member("a", None, &mut rand::rng()).unwrap();

        assert_eq!(departure.game, GameImpact::None);
        assert!(state.game.is_some());
    }

    #[test]
    fn test_settle_after_vote() {
        let mut state = state_with(&["a", "b", "spy"]);
        start(&mut state, "spy");
        let mut rng = rand::rng();
        for _ in 0..3 {
            ready_everyone(&mut state);
            state.advance_game(&mut rng);
        }
        let ids = state.member_ids();
        let game = state.game.as_mut().unwrap();
        game.cast_vote("a", "spy", &ids).unwrap();
        game.cast_vote("b", "spy", &ids).unwrap();
        game.cast_vote("spy", "a", &ids).unwrap();

        let progress = state.advance_game(&mut rng);

        assert!(matches!(progress, Progress::Finished(_)));
        assert_eq!(state.scores["spy"], Score { wins: 0, losses: 1 });
        assert_eq!(state.scores["a"], Score { wins: 1, losses: 0 });
        assert_eq!(state.scores["b"], Score { wins: 1, losses: 0 });
    }

    #[test]
    fn test_subscriptions() {
        let mut state = state_with(&["a", "b"]);
        let (tx, _rx) = mpsc::channel(1);

        let (first, existing) = state.add_subscriber("a".to_string(), tx.clone());
        assert_eq!(existing, 0);
        let (second, existing) = state.add_subscriber("a".to_string(), tx.clone());
        assert_eq!(existing, 1);
        assert_ne!(first, second);
        state.add_subscriber("b".to_string(), tx);
        assert_eq!(state.subscription_count("a"), 2);

        assert!(state.remove_subscriber(first).is_some());
        assert!(state.remove_subscriber(first).is_none());
        assert_eq!(state.subscription_count("a"), 1);

        // Leaving drops the player's remaining subscriptions
        state.remove_member("a", None, &mut rand::rng());
        assert_eq!(state.subscription_count("a"), 0);
        assert_eq!(state.subscribers().len(), 1);
    }
}
