//! Credibility votes and tallies.

use serde::{Deserialize, Serialize};

/// Direction of a credibility vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
}

/// One voter's vote on one incident. Unique per (incident, voter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: String,
    pub incident_id: String,
    pub voter_id: String,
    pub kind: VoteKind,
}

impl Vote {
    /// Key prefix in the RocksDB record store.
    pub const KEY_PREFIX: &'static str = "vote";

    pub fn new(id: String, incident_id: &str, voter_id: &str, kind: VoteKind) -> Self {
        Self {
            id,
            incident_id: incident_id.to_string(),
            voter_id: voter_id.to_string(),
            kind,
        }
    }
}

/// What a cast did to the caller's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    /// First vote by this voter on this incident.
    Added,
    /// Switched from one kind to the other.
    Updated,
    /// Repeated the same kind, which withdraws the vote.
    Removed,
}

/// Up/down counts for an incident at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub upvotes: u64,
    pub downvotes: u64,
    pub total: u64,
}

impl Tally {
    pub fn new(upvotes: u64, downvotes: u64) -> Self {
        Self {
            upvotes,
            downvotes,
            total: upvotes + downvotes,
        }
    }

    /// Count a set of votes.
    pub fn from_kinds<I: IntoIterator<Item = VoteKind>>(kinds: I) -> Self {
        let (up, down) = kinds.into_iter().fold((0, 0), |(up, down), kind| match kind {
            VoteKind::Up => (up + 1, down),
            VoteKind::Down => (up, down + 1),
        });
        Self::new(up, down)
    }
}

/// Tally as seen by one (possibly anonymous) viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyView {
    pub upvotes: u64,
    pub downvotes: u64,
    pub total: u64,
    /// The viewer's own vote; always `None` for anonymous viewers.
    pub viewer_vote: Option<VoteKind>,
}

impl TallyView {
    pub fn new(tally: Tally, viewer_vote: Option<VoteKind>) -> Self {
        Self {
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
            total: tally.total,
            viewer_vote,
        }
    }

    pub fn tally(&self) -> Tally {
        Tally::new(self.upvotes, self.downvotes)
    }
}

/// Result of casting a vote, returned to the voter only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub action: VoteAction,
    pub tally: Tally,
    /// The voter's vote after the cast, `None` when withdrawn.
    pub viewer_vote: Option<VoteKind>,
}
