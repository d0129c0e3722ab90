use std::collections::HashMap;

use super::models::PlayerId;

/// Vote counts for one election round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub counts: HashMap<PlayerId, usize>,
    /// Suspects sharing the highest count, sorted by id
    pub leaders: Vec<PlayerId>,
}

impl Tally {
    /// Count votes (voter -> suspect) per suspect and find the leaders
    pub fn count(votes: &HashMap<PlayerId, PlayerId>) -> Self {
        let mut counts: HashMap<PlayerId, usize> = HashMap::new();
        for suspect in votes.values() {
            *counts.entry(suspect.clone()).or_insert(0) += 1;
        }

        let max_votes = counts.values().copied().max().unwrap_or(0);
        let mut leaders: Vec<PlayerId> = counts
            .iter()
            .filter(|(_, count)| **count == max_votes && max_votes > 0)
            .map(|(suspect, _)| suspect.clone())
            .collect();
        leaders.sort();

        Self { counts, leaders }
    }

    /// More than one suspect shares the top count
    pub fn is_tie(&self) -> bool {
        self.leaders.len() > 1
    }

    /// The single most-voted suspect, if exactly one exists
    pub fn unique_leader(&self) -> Option<&PlayerId> {
        match self.leaders.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}
