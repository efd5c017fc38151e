//! Payloads pushed through the fan-out broker.
//!
//! Broadcast payloads never carry one viewer's personal state. A vote event
//! names the `actor_id` instead, and each client decides for itself whether
//! the delta reflects its own action.

use serde::Serialize;
use tracing::warn;
use vigil_broker::{Broker, Delivery, EventName, Topic};

use crate::models::{Comment, Incident, Tally, VoteAction};

/// `incident-created`, feed only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentCreated<'a> {
    pub incident: &'a Incident,
    /// Always zero; lets a new viewer render without a follow-up fetch.
    pub tally: Tally,
}

/// `incident-deleted`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDeleted<'a> {
    pub incident_id: &'a str,
}

/// `vote-updated`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdated<'a> {
    pub incident_id: &'a str,
    pub upvotes: u64,
    pub downvotes: u64,
    pub total: u64,
    pub actor_id: &'a str,
    pub action: VoteAction,
}

/// `incident-flagged`, `false-report-accepted`, `false-report-rejected`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagState<'a> {
    pub incident_id: &'a str,
    pub is_flagged: bool,
    pub verified_false: bool,
}

impl<'a> FlagState<'a> {
    pub fn of(incident: &'a Incident) -> Self {
        Self {
            incident_id: &incident.id,
            is_flagged: incident.is_flagged,
            verified_false: incident.verified_false,
        }
    }
}

/// `comment-added`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAdded<'a> {
    pub comment: &'a Comment,
}

/// `comment-deleted`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted<'a> {
    pub incident_id: &'a str,
    pub comment_id: &'a str,
}

/// Serialize `payload` and publish it to each topic in order.
///
/// Fire-and-forget: a payload that fails to serialize is logged and skipped,
/// never surfaced to the mutation that produced it.
pub fn publish<P: Serialize>(
    broker: &Broker,
    topics: impl IntoIterator<Item = Topic>,
    event: EventName,
    payload: &P,
) -> Delivery {
    match serde_json::to_value(payload) {
        Ok(value) => broker.publish_to(topics, event, value),
        Err(e) => {
            warn!(event = %event, error = %e, "failed to encode event payload");
            Delivery::default()
        }
    }
}
