//! Latest authoritative voting tally.
//!
//! [`VoteAggregator`] holds exactly one [`VotingSnapshot`]. Every
//! `voting_update` replaces it outright; individual `vote_cast` events are
//! never folded in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Full tally of the current voting round as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingSnapshot {
    /// Players who have voted so far.
    pub voters: BTreeSet<String>,
    pub votes_count: u32,
    /// Players still in the game (and therefore eligible to vote).
    pub alive_count: u32,
}

impl VotingSnapshot {
    /// Fresh tally at the start of a voting round.
    pub fn empty(alive_count: u32) -> Self {
        Self {
            voters: BTreeSet::new(),
            votes_count: 0,
            alive_count,
        }
    }

    pub fn has_voted(&self, name: &str) -> bool {
        self.voters.contains(name)
    }

    /// Votes still outstanding. Never negative even if the server over-reports.
    pub fn remaining(&self) -> u32 {
        self.alive_count.saturating_sub(self.votes_count)
    }
}

/// Outcome of one voting round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    /// `None` when nobody was eliminated (e.g. a tie).
    pub eliminated_name: Option<String>,
    pub tally: BTreeMap<String, u32>,
}

/// Reducer over voting snapshots: last write wins.
#[derive(Debug, Clone, Default)]
pub struct VoteAggregator {
    current: VotingSnapshot,
}

impl VoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The held snapshot.
    pub fn current(&self) -> &VotingSnapshot {
        &self.current
    }

    /// Replace the held snapshot unconditionally.
    pub fn apply_snapshot(&mut self, snapshot: VotingSnapshot) {
        self.current = snapshot;
    }

    /// Start a new voting round with no votes cast.
    pub fn reset(&mut self, alive_count: u32) {
        self.current = VotingSnapshot::empty(alive_count);
    }

    /// Forget the round entirely.
    pub fn discard(&mut self) {
        self.current = VotingSnapshot::default();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn snapshot(voters: &[&str], votes_count: u32, alive_count: u32) -> VotingSnapshot {
        VotingSnapshot {
            voters: voters.iter().map(|v| v.to_string()).collect(),
            votes_count,
            alive_count,
        }
    }

    #[test]
    fn reset_starts_from_zero() {
        let mut votes = VoteAggregator::new();
        votes.apply_snapshot(snapshot(&["A"], 1, 4));
        votes.reset(5);
        assert_eq!(votes.current(), &snapshot(&[], 0, 5));
    }

    #[test]
    fn latest_snapshot_wins_even_when_smaller() {
        let mut votes = VoteAggregator::new();
        votes.reset(5);
        votes.apply_snapshot(snapshot(&["A", "B", "C"], 3, 5));
        votes.apply_snapshot(snapshot(&["A"], 1, 4));
        assert_eq!(votes.current(), &snapshot(&["A"], 1, 4));
    }

    #[test]
    fn any_sequence_leaves_the_last_snapshot() {
        let sequence = [
            snapshot(&["A"], 1, 5),
            snapshot(&["A", "B"], 2, 5),
            snapshot(&[], 0, 3),
            snapshot(&["C", "D", "E"], 3, 3),
        ];
        let mut votes = VoteAggregator::new();
        for (i, s) in sequence.iter().enumerate() {
            votes.apply_snapshot(s.clone());
            assert_eq!(votes.current(), &sequence[i]);
        }
    }

    #[test]
    fn remaining_saturates() {
        assert_eq!(snapshot(&["A", "B"], 2, 5).remaining(), 3);
        assert_eq!(snapshot(&["A", "B"], 7, 5).remaining(), 0);
        assert!(snapshot(&["A"], 1, 5).has_voted("A"));
    }

    #[test]
    fn discard_clears_alive_count() {
        let mut votes = VoteAggregator::new();
        votes.reset(4);
        votes.discard();
        assert_eq!(votes.current(), &VotingSnapshot::default());
    }
}
