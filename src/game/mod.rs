// Public API
pub use catalog::{Catalog, CatalogError};
pub use logic::{Game, GameError};
pub use models::{Location, Outcome, Phase, PlayerId, PlayerInfo, Progress};
pub use tally::Tally;

/// Fewest members a game can be started or continued with
pub const MIN_PLAYERS: usize = 3;
/// Voting rounds allowed before a tie becomes final
pub const MAX_VOTE_ROUNDS: u32 = 3;

// Internal modules
mod catalog;
mod logic;
mod models;
mod tally;
