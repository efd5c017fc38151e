//! Record models for Vigil.
//!
//! # Core Types
//!
//! - [`Incident`] - user-submitted report of a local event
//! - [`Vote`] - one voter's credibility vote on an incident
//! - [`FalseReport`] - a claim that an incident is false
//! - [`Comment`] - threaded discussion entry
//!
//! # Request/Response Shapes
//!
//! - [`NewIncident`], [`NewComment`] - validated client input
//! - [`Tally`], [`TallyView`], [`VoteOutcome`] - vote counts
//! - [`ReportReceipt`], [`ReportStatus`] - report responses

mod comment;
mod incident;
mod report;
mod vote;

pub use comment::{Comment, NewComment, MAX_COMMENT_LEN};
pub use incident::{
    Category, Incident, Location, NewIncident, Severity, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
};
pub use report::{
    normalize_reason, FalseReport, ReportReceipt, ReportStatus, DEFAULT_REASON, MAX_REASON_LEN,
};
pub use vote::{Tally, TallyView, Vote, VoteAction, VoteKind, VoteOutcome};

pub use vigil_broker::now_millis;

/// Generate a fresh record id.
///
/// Blake3 over the seed, the current time and 16 random bytes, truncated to
/// 128 bits and hex encoded.
pub fn generate_id(seed: &[u8]) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed);
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&rand::random::<[u8; 16]>());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}
