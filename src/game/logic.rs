// A game is owned by its room. Every method here expects the caller to hold the
// room's exclusive lock and to pass in the room's live member ids.
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::models::{Location, Outcome, Phase, PlayerId, PlayerInfo, Progress};
use super::tally::Tally;
use super::MAX_VOTE_ROUNDS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Need at least {0} players to start")]
    NotEnoughPlayers(usize),
    #[error("Readiness cannot be changed during {0}")]
    NotReadyPhase(Phase),
    #[error("Not in voting phase")]
    NotVoting,
    #[error("Unknown suspect: {0}")]
    UnknownSuspect(PlayerId),
    #[error("Player is not part of this game: {0}")]
    NotParticipant(PlayerId),
}

#[derive(Debug, Clone, Serialize)]
pub struct Game {
    location: Location,
    spy_id: PlayerId,
    spy_name: String,
    player_info: HashMap<PlayerId, PlayerInfo>,
    phase: Phase,
    ready_to_reveal: HashMap<PlayerId, bool>,
    ready_after_reveal: HashMap<PlayerId, bool>,
    ready_to_vote: HashMap<PlayerId, bool>,
    votes: HashMap<PlayerId, PlayerId>,
    vote_round: u32,
    play_started_at: Option<DateTime<Utc>>,
    first_questioner: Option<PlayerId>,
    spy_forfeited: bool,
    outcome: Option<Outcome>,
}

impl Game {
    /// Creates a game in the ready check with every participant marked not ready
    pub fn new(
        location: Location,
        spy_id: PlayerId,
        spy_name: String,
        player_info: HashMap<PlayerId, PlayerInfo>,
    ) -> Self {
        let ready_to_reveal = player_info.keys().map(|id| (id.clone(), false)).collect();

        Self {
            location,
            spy_id,
            spy_name,
            player_info,
            phase: Phase::ReadyCheck,
            ready_to_reveal,
            ready_after_reveal: HashMap::new(),
            ready_to_vote: HashMap::new(),
            votes: HashMap::new(),
            vote_round: 1,
            play_started_at: None,
            first_questioner: None,
            spy_forfeited: false,
            outcome: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn spy_id(&self) -> &str {
        &self.spy_id
    }

    pub fn spy_name(&self) -> &str {
        &self.spy_name
    }

    pub fn player_info(&self, player_id: &str) -> Option<&PlayerInfo> {
        self.player_info.get(player_id)
    }

    pub fn challenges(&self) -> HashMap<PlayerId, String> {
        self.player_info
            .iter()
            .map(|(id, info)| (id.clone(), info.challenge.clone()))
            .collect()
    }

    pub fn votes(&self) -> &HashMap<PlayerId, PlayerId> {
        &self.votes
    }

    pub fn vote_round(&self) -> u32 {
        self.vote_round
    }

    pub fn play_started_at(&self) -> Option<DateTime<Utc>> {
        self.play_started_at
    }

    pub fn first_questioner(&self) -> Option<&PlayerId> {
        self.first_questioner.as_ref()
    }

    pub fn spy_forfeited(&self) -> bool {
        self.spy_forfeited
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn has_voted(&self, player_id: &str) -> bool {
        self.votes.contains_key(player_id)
    }

    fn ready_map(&self) -> Option<&HashMap<PlayerId, bool>> {
        match self.phase {
            Phase::ReadyCheck => Some(&self.ready_to_reveal),
            Phase::RoleReveal => Some(&self.ready_after_reveal),
            Phase::Playing => Some(&self.ready_to_vote),
            Phase::Voting | Phase::Finished => None,
        }
    }

    fn ready_map_mut(&mut self) -> Option<&mut HashMap<PlayerId, bool>> {
        match self.phase {
            Phase::ReadyCheck => Some(&mut self.ready_to_reveal),
            Phase::RoleReveal => Some(&mut self.ready_after_reveal),
            Phase::Playing => Some(&mut self.ready_to_vote),
            Phase::Voting | Phase::Finished => None,
        }
    }

    /// Whether the player is ready in the current phase. Absent means not ready.
    pub fn is_ready(&self, player_id: &str) -> bool {
        self.ready_map()
            .and_then(|map| map.get(player_id))
            .copied()
            .unwrap_or(false)
    }

    /// Ready players among the live members for the current phase
    pub fn ready_count(&self, members: &[PlayerId]) -> usize {
        match self.ready_map() {
            Some(map) => members
                .iter()
                .filter(|id| map.get(*id).copied().unwrap_or(false))
                .count(),
            None => 0,
        }
    }

    /// Votes cast by live members
    pub fn vote_count(&self, members: &[PlayerId]) -> usize {
        members.iter().filter(|id| self.votes.contains_key(*id)).count()
    }

    /// Flips the player's readiness for the current phase and returns the new value
    pub fn toggle_ready(&mut self, player_id: &str) -> Result<bool, GameError> {
        let phase = self.phase;
        let map = self
            .ready_map_mut()
            .ok_or(GameError::NotReadyPhase(phase))?;

        let entry = map.entry(player_id.to_string()).or_insert(false);
        *entry = !*entry;
        Ok(*entry)
    }

    /// Records (or replaces) a vote. Both voter and suspect must be live members.
    pub fn cast_vote(
        &mut self,
        voter_id: &str,
        suspect_id: &str,
        members: &[PlayerId],
    ) -> Result<(), GameError> {
        if self.phase != Phase::Voting {
            return Err(GameError::NotVoting);
        }
        if !members.iter().any(|id| id == voter_id) {
            return Err(GameError::NotParticipant(voter_id.to_string()));
        }
        if !members.iter().any(|id| id == suspect_id) {
            return Err(GameError::UnknownSuspect(suspect_id.to_string()));
        }

        self.votes
            .insert(voter_id.to_string(), suspect_id.to_string());
        Ok(())
    }

    /// Re-evaluates the advancement rule for the current phase.
    ///
    /// Called after every readiness change, vote, and membership change. Counts
    /// are always recomputed from `members`, so a departure can complete a phase
    /// on its own.
    pub fn advance<R: Rng + ?Sized>(&mut self, members: &[PlayerId], rng: &mut R) -> Progress {
        let total = members.len();
        if total == 0 {
            return Progress::Unchanged;
        }

        let from = self.phase;
        match from {
            Phase::ReadyCheck => {
                if self.ready_count(members) != total {
                    return Progress::Unchanged;
                }
                self.phase = Phase::RoleReveal;
                for id in members {
                    self.ready_after_reveal.entry(id.clone()).or_insert(false);
                }
            }
            Phase::RoleReveal => {
                if self.ready_count(members) != total {
                    return Progress::Unchanged;
                }
                self.phase = Phase::Playing;
                self.play_started_at = Some(Utc::now());
                for id in members {
                    self.ready_to_vote.entry(id.clone()).or_insert(false);
                }
                if self.first_questioner.is_none() {
                    self.first_questioner = members.choose(rng).cloned();
                }
            }
            Phase::Playing => {
                if self.ready_count(members) <= total / 2 {
                    return Progress::Unchanged;
                }
                self.phase = Phase::Voting;
            }
            Phase::Voting => {
                if self.vote_count(members) != total {
                    return Progress::Unchanged;
                }
                return self.resolve_votes();
            }
            Phase::Finished => return Progress::Unchanged,
        }

        debug!(from = %from, to = %self.phase, "Game phase advanced");
        Progress::Advanced {
            from,
            to: self.phase,
        }
    }

    fn resolve_votes(&mut self) -> Progress {
        let tally = Tally::count(&self.votes);

        if tally.is_tie() && self.vote_round < MAX_VOTE_ROUNDS {
            self.votes.clear();
            self.vote_round += 1;
            debug!(round = self.vote_round, leaders = ?tally.leaders, "Vote tied, starting revote");
            return Progress::Revote {
                round: self.vote_round,
            };
        }

        // An exhausted tie has no accused suspect, so the spy escapes
        let accused = tally.unique_leader().cloned();
        let outcome = Outcome {
            innocents_won: accused.as_deref() == Some(self.spy_id.as_str()),
            accused,
            tied: tally.is_tie(),
            spy_forfeited: false,
            vote_counts: tally.counts,
        };

        self.phase = Phase::Finished;
        self.outcome = Some(outcome.clone());
        Progress::Finished(outcome)
    }

    /// Purges a departing player from every per-player map.
    /// Returns true if that player was the spy.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.player_info.remove(player_id);
        self.ready_to_reveal.remove(player_id);
        self.ready_after_reveal.remove(player_id);
        self.ready_to_vote.remove(player_id);
        self.votes.remove(player_id);

        if self.first_questioner.as_deref() == Some(player_id) {
            self.first_questioner = None;
        }

        self.spy_id == player_id
    }

    /// Ends the game immediately in favour of the innocents
    pub fn forfeit(&mut self) -> Outcome {
        let outcome = Outcome::forfeit(&self.spy_id);
        self.phase = Phase::Finished;
        self.spy_forfeited = true;
        self.outcome = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn game_for(members: &[PlayerId], spy: &str) -> Game {
        let player_info = members
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    PlayerInfo {
                        challenge: format!("challenge for {}", id),
                        is_spy: id == spy,
                    },
                )
            })
            .collect();
        Game::new(
            Location {
                word: "Lighthouse".to_string(),
                categories: vec!["Coast".to_string()],
            },
            spy.to_string(),
            spy.to_uppercase(),
            player_info,
        )
    }

    fn ready_all(game: &mut Game, members: &[PlayerId]) {
        for id in members {
            game.toggle_ready(id).unwrap();
        }
    }

    /// Walks a game through to the voting phase
    fn voting_game(members: &[PlayerId], spy: &str) -> Game {
        let mut rng = rand::rng();
        let mut game = game_for(members, spy);
        ready_all(&mut game, members);
        game.advance(members, &mut rng);
        ready_all(&mut game, members);
        game.advance(members, &mut rng);
        ready_all(&mut game, members);
        game.advance(members, &mut rng);
        assert_eq!(game.phase(), Phase::Voting);
        game
    }

    fn vote_all(game: &mut Game, members: &[PlayerId], ballots: &[(&str, &str)]) -> Progress {
        for (voter, suspect) in ballots {
            game.cast_vote(voter, suspect, members).unwrap();
        }
        game.advance(members, &mut rand::rng())
    }

    #[test]
    fn test_new_game_starts_in_ready_check() {
        let members = ids(&["a", "b", "c"]);
        let game = game_for(&members, "a");

        assert_eq!(game.phase(), Phase::ReadyCheck);
        assert_eq!(game.vote_round(), 1);
        assert_eq!(game.ready_count(&members), 0);
        assert!(!game.is_ready("a"));
        assert!(game.first_questioner().is_none());
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let members = ids(&["a", "b", "c"]);
        let mut game = game_for(&members, "a");

        assert!(game.toggle_ready("b").unwrap());
        assert!(!game.toggle_ready("b").unwrap());
        assert_eq!(game.ready_count(&members), 0);
        assert_eq!(game.advance(&members, &mut rand::rng()), Progress::Unchanged);
        assert_eq!(game.phase(), Phase::ReadyCheck);
    }

    #[test]
    fn test_ready_check_requires_everyone() {
        let members = ids(&["a", "b", "c"]);
        let mut game = game_for(&members, "a");
        let mut rng = rand::rng();

        game.toggle_ready("a").unwrap();
        game.toggle_ready("b").unwrap();
        assert_eq!(game.advance(&members, &mut rng), Progress::Unchanged);

        game.toggle_ready("c").unwrap();
        assert_eq!(
            game.advance(&members, &mut rng),
            Progress::Advanced {
                from: Phase::ReadyCheck,
                to: Phase::RoleReveal
            }
        );
        // Next phase starts with everyone not ready
        assert_eq!(game.ready_count(&members), 0);
        assert!(!game.is_ready("a"));
    }

    #[test]
    fn test_role_reveal_starts_play_and_picks_questioner() {
        let members = ids(&["a", "b", "c"]);
        let mut game = game_for(&members, "a");
        let mut rng = rand::rng();

        ready_all(&mut game, &members);
        game.advance(&members, &mut rng);
        ready_all(&mut game, &members);

        assert_eq!(
            game.advance(&members, &mut rng),
            Progress::Advanced {
                from: Phase::RoleReveal,
                to: Phase::Playing
            }
        );
        assert!(game.play_started_at().is_some());
        let questioner = game.first_questioner().cloned().unwrap();
        assert!(members.contains(&questioner));
    }

    #[rstest]
    #[case(5, 2, false)]
    #[case(5, 3, true)]
    #[case(4, 2, false)]
    #[case(4, 3, true)]
    #[case(3, 1, false)]
    #[case(3, 2, true)]
    fn test_playing_needs_strict_majority(
        #[case] total: usize,
        #[case] ready: usize,
        #[case] advances: bool,
    ) {
        let names: Vec<String> = (0..total).map(|i| format!("p{}", i)).collect();
        let members: Vec<PlayerId> = names.clone();
        let mut game = game_for(&members, "p0");
        let mut rng = rand::rng();

        ready_all(&mut game, &members);
        game.advance(&members, &mut rng);
        ready_all(&mut game, &members);
        game.advance(&members, &mut rng);
        assert_eq!(game.phase(), Phase::Playing);

        for id in members.iter().take(ready) {
            game.toggle_ready(id).unwrap();
        }
        let progress = game.advance(&members, &mut rng);

        assert_eq!(!progress.is_unchanged(), advances);
        let expected = if advances { Phase::Voting } else { Phase::Playing };
        assert_eq!(game.phase(), expected);
    }

    #[test]
    fn test_toggle_rejected_while_voting() {
        let members = ids(&["a", "b", "c"]);
        let mut game = voting_game(&members, "a");

        assert_eq!(
            game.toggle_ready("a"),
            Err(GameError::NotReadyPhase(Phase::Voting))
        );
    }

    #[test]
    fn test_vote_rejected_outside_voting() {
        let members = ids(&["a", "b", "c"]);
        let mut game = game_for(&members, "a");

        assert_eq!(game.cast_vote("a", "b", &members), Err(GameError::NotVoting));
        assert!(game.votes().is_empty());
    }

    #[test]
    fn test_vote_for_unknown_suspect() {
        let members = ids(&["a", "b", "c"]);
        let mut game = voting_game(&members, "a");

        assert_eq!(
            game.cast_vote("a", "zed", &members),
            Err(GameError::UnknownSuspect("zed".to_string()))
        );
    }

    #[test]
    fn test_majority_on_spy_finishes_with_innocent_win() {
        let members = ids(&["spy", "a", "b"]);
        let mut game = voting_game(&members, "spy");

        let progress = vote_all(&mut game, &members, &[("a", "spy"), ("b", "spy"), ("spy", "a")]);

        match progress {
            Progress::Finished(outcome) => {
                assert!(outcome.innocents_won);
                assert_eq!(outcome.accused.as_deref(), Some("spy"));
                assert!(!outcome.tied);
                assert_eq!(outcome.vote_counts.get("spy"), Some(&2));
            }
            other => panic!("expected finish, got {:?}", other),
        }
        assert_eq!(game.phase(), Phase::Finished);
    }

    #[test]
    fn test_wrong_accusation_lets_spy_win() {
        let members = ids(&["spy", "a", "b"]);
        let mut game = voting_game(&members, "spy");

        let progress = vote_all(&mut game, &members, &[("a", "b"), ("b", "a"), ("spy", "a")]);

        match progress {
            Progress::Finished(outcome) => {
                assert!(!outcome.innocents_won);
                assert_eq!(outcome.accused.as_deref(), Some("a"));
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_votes_do_not_resolve() {
        let members = ids(&["spy", "a", "b"]);
        let mut game = voting_game(&members, "spy");

        let progress = vote_all(&mut game, &members, &[("a", "spy"), ("b", "spy")]);
        assert_eq!(progress, Progress::Unchanged);
        assert_eq!(game.phase(), Phase::Voting);
    }

    #[test]
    fn test_tie_revotes_until_cap() {
        let members = ids(&["a", "b", "c", "d"]);
        let mut game = voting_game(&members, "a");
        let split = [("a", "c"), ("b", "c"), ("c", "d"), ("d", "d")];

        assert_eq!(vote_all(&mut game, &members, &split), Progress::Revote { round: 2 });
        assert!(game.votes().is_empty());
        assert_eq!(game.phase(), Phase::Voting);

        assert_eq!(vote_all(&mut game, &members, &split), Progress::Revote { round: 3 });
        assert_eq!(game.vote_round(), 3);

        match vote_all(&mut game, &members, &split) {
            Progress::Finished(outcome) => {
                assert!(outcome.tied);
                assert!(outcome.accused.is_none());
                assert!(!outcome.innocents_won);
            }
            other => panic!("expected exhausted tie, got {:?}", other),
        }
        assert_eq!(game.vote_round(), MAX_VOTE_ROUNDS);
        assert_eq!(game.phase(), Phase::Finished);
    }

    #[test]
    fn test_remove_player_purges_state() {
        let members = ids(&["a", "b", "c", "d"]);
        let mut game = game_for(&members, "a");
        game.toggle_ready("d").unwrap();

        let was_spy = game.remove_player("d");

        assert!(!was_spy);
        assert!(game.player_info("d").is_none());
        assert!(!game.is_ready("d"));
        assert!(game.remove_player("a"));
    }

    #[test]
    fn test_departure_completes_ready_check() {
        let members = ids(&["a", "b", "c", "d"]);
        let mut game = game_for(&members, "a");
        for id in ["a", "b", "c"] {
            game.toggle_ready(id).unwrap();
        }
        assert_eq!(game.advance(&members, &mut rand::rng()), Progress::Unchanged);

        game.remove_player("d");
        let remaining = ids(&["a", "b", "c"]);

        assert_eq!(game.ready_count(&remaining), 3);
        assert_eq!(
            game.advance(&remaining, &mut rand::rng()),
            Progress::Advanced {
                from: Phase::ReadyCheck,
                to: Phase::RoleReveal
            }
        );
    }

    #[test]
    fn test_departure_clears_first_questioner() {
        let members = ids(&["a", "b", "c", "d"]);
        let mut game = game_for(&members, "a");
        let mut rng = rand::rng();
        ready_all(&mut game, &members);
        game.advance(&members, &mut rng);
        ready_all(&mut game, &members);
        game.advance(&members, &mut rng);

        let questioner = game.first_questioner().cloned().unwrap();
        game.remove_player(&questioner);

        assert!(game.first_questioner().is_none());
    }

    #[test]
    fn test_forfeit() {
        let members = ids(&["a", "b", "c"]);
        let mut game = game_for(&members, "b");

        let outcome = game.forfeit();

        assert!(outcome.innocents_won);
        assert!(outcome.spy_forfeited);
        assert!(game.spy_forfeited());
        assert_eq!(game.phase(), Phase::Finished);
        assert_eq!(game.advance(&members, &mut rand::rng()), Progress::Unchanged);
    }

    #[test]
    fn test_ballots_against_a_departed_player_still_count() {
        let members = ids(&["a", "b", "c", "d"]);
        let mut game = voting_game(&members, "a");
        game.cast_vote("b", "d", &members).unwrap();
        game.cast_vote("c", "d", &members).unwrap();
        game.cast_vote("a", "b", &members).unwrap();

        assert!(!game.remove_player("d"));
        let remaining = ids(&["a", "b", "c"]);

        match game.advance(&remaining, &mut rand::rng()) {
            Progress::Finished(outcome) => {
                assert_eq!(outcome.accused.as_deref(), Some("d"));
                assert!(!outcome.innocents_won);
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }
}
