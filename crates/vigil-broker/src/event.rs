//! Fan-out event envelope.

use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// Name of a state change pushed to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    /// A new incident was reported (feed only).
    IncidentCreated,
    /// An incident and its dependents were removed.
    IncidentDeleted,
    /// The first unresolved false report flagged an incident.
    IncidentFlagged,
    /// The vote tally of an incident changed.
    VoteUpdated,
    /// A moderator confirmed an incident as false.
    FalseReportAccepted,
    /// A moderator dismissed the false reports on an incident.
    FalseReportRejected,
    /// A comment was posted on an incident.
    CommentAdded,
    /// A comment was removed from an incident.
    CommentDeleted,
}

impl EventName {
    /// Wire name of the event.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventName::IncidentCreated => "incident-created",
            EventName::IncidentDeleted => "incident-deleted",
            EventName::IncidentFlagged => "incident-flagged",
            EventName::VoteUpdated => "vote-updated",
            EventName::FalseReportAccepted => "false-report-accepted",
            EventName::FalseReportRejected => "false-report-rejected",
            EventName::CommentAdded => "comment-added",
            EventName::CommentDeleted => "comment-deleted",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a subscriber receives: one delta on one topic.
///
/// Consumers reconcile each envelope against their own state; `occurred_at`
/// is a wall-clock stamp, not a sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub topic: Topic,
    pub event_name: EventName,
    pub payload: serde_json::Value,
    /// Milliseconds since the UNIX epoch.
    pub occurred_at: u64,
}

impl Envelope {
    /// Stamp a new envelope with the current time.
    pub fn new(topic: Topic, event_name: EventName, payload: serde_json::Value) -> Self {
        Self {
            topic,
            event_name,
            payload,
            occurred_at: now_millis(),
        }
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
