use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::logic::{Game, GameError};
use super::models::{Location, PlayerId, PlayerInfo};
use super::MIN_PLAYERS;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Catalog has no {0}")]
    Empty(&'static str),
}

/// Locations and challenges that games are dealt from.
/// Both lists are guaranteed non-empty.
#[derive(Debug, Clone)]
pub struct Catalog {
    locations: Vec<Location>,
    challenges: Vec<String>,
}

impl Catalog {
    pub fn new(locations: Vec<Location>, challenges: Vec<String>) -> Result<Self, CatalogError> {
        if locations.is_empty() {
            return Err(CatalogError::Empty("locations"));
        }
        if challenges.is_empty() {
            return Err(CatalogError::Empty("challenges"));
        }
        Ok(Self {
            locations,
            challenges,
        })
    }

    /// Loads `places.json` and `challenges.json` from a data directory
    pub fn load(dir: &Path) -> Result<Self, CatalogError> {
        let locations: Vec<Location> = read_json(&dir.join("places.json"))?;
        let challenges: Vec<String> = read_json(&dir.join("challenges.json"))?;

        info!(
            locations = locations.len(),
            challenges = challenges.len(),
            dir = %dir.display(),
            "Loaded catalog"
        );
        Self::new(locations, challenges)
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn challenges(&self) -> &[String] {
        &self.challenges
    }

    /// Deals a new game over `members` (id, display name).
    ///
    /// Picks a random location and a random spy, then hands out the shuffled
    /// challenges round-robin so every player gets one.
    pub fn deal<R: Rng + ?Sized>(
        &self,
        members: &[(PlayerId, String)],
        rng: &mut R,
    ) -> Result<Game, GameError> {
        if members.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers(MIN_PLAYERS));
        }

        let location = self
            .locations
            .choose(rng)
            .cloned()
            .ok_or(GameError::NotEnoughPlayers(MIN_PLAYERS))?;
        let (spy_id, spy_name) = members
            .choose(rng)
            .cloned()
            .ok_or(GameError::NotEnoughPlayers(MIN_PLAYERS))?;

        let mut challenges = self.challenges.clone();
        challenges.shuffle(rng);

        let player_info: HashMap<PlayerId, PlayerInfo> = members
            .iter()
            .enumerate()
            .map(|(i, (id, _))| {
                let info = PlayerInfo {
                    challenge: challenges[i % challenges.len()].clone(),
                    is_spy: *id == spy_id,
                };
                (id.clone(), info)
            })
            .collect();

        debug!(location = %location.word, players = members.len(), "Dealt new game");
        Ok(Game::new(location, spy_id, spy_name, player_info))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let location = |word: &str, categories: &[&str]| Location {
            word: word.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        };

        let locations = vec![
            location("Airport", &["Travel", "Buildings"]),
            location("Beach", &["Nature", "Holidays"]),
            location("Casino", &["Entertainment", "Buildings"]),
            location("Hospital", &["Work", "Buildings"]),
            location("Library", &["Education", "Buildings"]),
            location("Pirate Ship", &["Adventure", "Vehicles"]),
            location("Space Station", &["Science", "Vehicles"]),
            location("Submarine", &["Military", "Vehicles"]),
            location("Supermarket", &["Shopping", "Buildings"]),
            location("Zoo", &["Animals", "Entertainment"]),
        ];

        let challenges = [
            "Mention a colour in every answer",
            "Answer every question with a question at least once",
            "Work the word \"honestly\" into the conversation",
            "Compliment another player",
            "Ask someone about the weather",
            "Pretend to have been here before",
            "Refer to someone by the wrong name once",
            "Use a number in each of your questions",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();

        Self {
            locations,
            challenges,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let data = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
