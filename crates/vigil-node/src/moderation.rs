//! Moderation state machine.
//!
//! An incident's moderation state is derived from its two flags:
//!
//! | state           | `is_flagged` | `verified_false` |
//! |-----------------|--------------|------------------|
//! | `Normal`        | false        | false            |
//! | `Flagged`       | true         | false            |
//! | `VerifiedFalse` | false        | true             |
//!
//! Filing a report moves `Normal` to `Flagged` (see
//! [`ReportLedger`](crate::reports::ReportLedger)). Moderator verdicts move
//! any state to `VerifiedFalse` (accept) or back to `Normal` (reject, the
//! "restored" transition). Verdicts never delete reports.

use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_broker::{Broker, EventName, Topic};

use crate::error::{Error, Result};
use crate::events::{self, FlagState};
use crate::identity::Identity;
use crate::models::Incident;
use crate::records::Records;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModerationState {
    Normal,
    Flagged,
    VerifiedFalse,
}

impl ModerationState {
    pub fn of(incident: &Incident) -> Self {
        match (incident.is_flagged, incident.verified_false) {
            (_, true) => ModerationState::VerifiedFalse,
            (true, false) => ModerationState::Flagged,
            (false, false) => ModerationState::Normal,
        }
    }

    /// The `(is_flagged, verified_false)` pair persisted for this state.
    pub const fn flags(&self) -> (bool, bool) {
        match self {
            ModerationState::Normal => (false, false),
            ModerationState::Flagged => (true, false),
            ModerationState::VerifiedFalse => (false, true),
        }
    }
}

/// A moderator's decision on a flagged incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Reject,
}

impl Verdict {
    fn target(&self) -> ModerationState {
        match self {
            Verdict::Accept => ModerationState::VerifiedFalse,
            Verdict::Reject => ModerationState::Normal,
        }
    }

    fn event(&self) -> EventName {
        match self {
            Verdict::Accept => EventName::FalseReportAccepted,
            Verdict::Reject => EventName::FalseReportRejected,
        }
    }
}

/// Flags after a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationOutcome {
    pub is_flagged: bool,
    pub verified_false: bool,
}

impl From<&Incident> for ModerationOutcome {
    fn from(incident: &Incident) -> Self {
        Self {
            is_flagged: incident.is_flagged,
            verified_false: incident.verified_false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Moderation {
    records: Records,
    broker: Broker,
}

impl Moderation {
    pub fn new(records: Records, broker: Broker) -> Self {
        Self { records, broker }
    }

    /// Mark the incident verified false. Idempotent on state.
    pub async fn accept_report(&self, incident_id: &str, caller: &Identity) -> Result<ModerationOutcome> {
        self.decide(incident_id, Verdict::Accept, caller).await
    }

    /// Clear the flag and restore the incident to normal. Legal on an
    /// incident that was never flagged.
    pub async fn reject_report(&self, incident_id: &str, caller: &Identity) -> Result<ModerationOutcome> {
        self.decide(incident_id, Verdict::Reject, caller).await
    }

    /// Apply a verdict. Every call publishes its event, even when the state
    /// did not change.
    pub async fn decide(
        &self,
        incident_id: &str,
        verdict: Verdict,
        caller: &Identity,
    ) -> Result<ModerationOutcome> {
        caller.require_moderator("moderation")?;

        let (is_flagged, verified_false) = verdict.target().flags();
        let id = incident_id.to_string();
        let incident = self
            .records
            .mutate("set_moderation", move |s, commit| {
                s.set_moderation(&id, is_flagged, verified_false, commit)
            })
            .await?
            .ok_or_else(|| Error::incident_not_found(incident_id))?;

        info!(incident_id, moderator = %caller.id, ?verdict, "moderation verdict applied");

        events::publish(
            &self.broker,
            Topic::feed_and_incident(incident_id),
            verdict.event(),
            &FlagState::of(&incident),
        );

        Ok(ModerationOutcome::from(&incident))
    }

    /// Incidents currently awaiting a verdict, newest first. Moderators only.
    pub async fn flagged_incidents(&self, caller: &Identity) -> Result<Vec<Incident>> {
        caller.require_moderator("viewing the moderation queue")?;
        self.pending().await
    }

    /// Flagged queue without the role check, for the local admin socket.
    pub(crate) async fn pending(&self) -> Result<Vec<Incident>> {
        let mut flagged: Vec<Incident> = self
            .records
            .run("list_incidents", |s| s.list_incidents())
            .await?
            .into_iter()
            .filter(|i| ModerationState::of(i) == ModerationState::Flagged)
            .collect();
        flagged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flagged)
    }
}
