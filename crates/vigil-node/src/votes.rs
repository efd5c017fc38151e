//! Vote ledger - one credibility vote per (incident, voter).
//!
//! Casting is a toggle: the first cast adds a vote, casting the same kind
//! again withdraws it, casting the other kind switches it. The tally is
//! recounted from the store after every mutation so the caller always reads
//! its own write.

use tracing::debug;
use vigil_broker::{Broker, EventName, Topic};

use crate::error::{Error, Result};
use crate::events::{self, VoteUpdated};
use crate::identity::Identity;
use crate::models::{generate_id, Tally, TallyView, Vote, VoteAction, VoteKind, VoteOutcome};
use crate::records::Records;

/// Upper bound on read-modify-write rounds for one cast.
const MAX_APPLY_ATTEMPTS: usize = 16;

#[derive(Debug, Clone)]
pub struct VoteLedger {
    records: Records,
    broker: Broker,
}

impl VoteLedger {
    pub fn new(records: Records, broker: Broker) -> Self {
        Self { records, broker }
    }

    /// Cast, switch or withdraw `voter`'s vote on an incident.
    pub async fn cast_vote(
        &self,
        incident_id: &str,
        voter: &Identity,
        kind: VoteKind,
    ) -> Result<VoteOutcome> {
        self.records.require_incident(incident_id).await?;

        let (action, viewer_vote) = self.apply(incident_id, &voter.id, kind).await?;
        let tally = self.count(incident_id).await?;

        debug!(incident_id, voter = %voter.id, ?action, ?tally, "vote cast");

        events::publish(
            &self.broker,
            Topic::feed_and_incident(incident_id),
            EventName::VoteUpdated,
            &VoteUpdated {
                incident_id,
                upvotes: tally.upvotes,
                downvotes: tally.downvotes,
                total: tally.total,
                actor_id: &voter.id,
                action,
            },
        );

        Ok(VoteOutcome {
            action,
            tally,
            viewer_vote,
        })
    }

    /// Current tally, plus the viewer's own vote when a viewer is given.
    pub async fn get_tally(&self, incident_id: &str, viewer_id: Option<&str>) -> Result<TallyView> {
        self.records.require_incident(incident_id).await?;
        let tally = self.count(incident_id).await?;
        let viewer_vote = match viewer_id {
            Some(viewer_id) => self.get_vote(incident_id, viewer_id).await?.map(|v| v.kind),
            None => None,
        };
        Ok(TallyView::new(tally, viewer_vote))
    }

    /// Apply the toggle/switch rule against the stored vote.
    ///
    /// Every failed attempt means another cast for the same pair landed in
    /// between, so the loop runs at most once per concurrent cast.
    async fn apply(
        &self,
        incident_id: &str,
        voter_id: &str,
        kind: VoteKind,
    ) -> Result<(VoteAction, Option<VoteKind>)> {
        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            match self.get_vote(incident_id, voter_id).await? {
                None => match self.insert(incident_id, voter_id, kind).await {
                    Ok(()) => return Ok((VoteAction::Added, Some(kind))),
                    Err(Error::Conflict(_)) => {}
                    Err(e) => return Err(e),
                },
                Some(existing) if existing.kind == kind => {
                    if self.delete(incident_id, voter_id).await? {
                        return Ok((VoteAction::Removed, None));
                    }
                }
                Some(_) => {
                    if self.update(incident_id, voter_id, kind).await?.is_some() {
                        return Ok((VoteAction::Updated, Some(kind)));
                    }
                }
            }
            debug!(incident_id, voter_id, attempt, "vote changed underneath cast, retrying");
        }
        Err(Error::Conflict(format!(
            "vote by {voter_id} on incident {incident_id} kept changing, try again"
        )))
    }

    async fn count(&self, incident_id: &str) -> Result<Tally> {
        let id = incident_id.to_string();
        self.records.run("tally", move |s| s.tally(&id)).await
    }

    async fn get_vote(&self, incident_id: &str, voter_id: &str) -> Result<Option<Vote>> {
        let (id, voter) = (incident_id.to_string(), voter_id.to_string());
        self.records
            .run("get_vote", move |s| s.get_vote(&id, &voter))
            .await
    }

    async fn insert(&self, incident_id: &str, voter_id: &str, kind: VoteKind) -> Result<()> {
        let vote = Vote::new(
            generate_id(format!("vote:{incident_id}:{voter_id}").as_bytes()),
            incident_id,
            voter_id,
            kind,
        );
        self.records
            .mutate("insert_vote", move |s, commit| s.insert_vote(&vote, commit))
            .await
    }

    async fn update(&self, incident_id: &str, voter_id: &str, kind: VoteKind) -> Result<Option<Vote>> {
        let (id, voter) = (incident_id.to_string(), voter_id.to_string());
        self.records
            .mutate("update_vote", move |s, commit| {
                s.update_vote_kind(&id, &voter, kind, commit)
            })
            .await
    }

    async fn delete(&self, incident_id: &str, voter_id: &str) -> Result<bool> {
        let (id, voter) = (incident_id.to_string(), voter_id.to_string());
        self.records
            .mutate("delete_vote", move |s, commit| s.delete_vote(&id, &voter, commit))
            .await
    }
}
