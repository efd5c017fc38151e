//! Incident lifecycle: creation, lookup, listing and cascade deletion.

use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_broker::{Broker, EventName, Topic};

use crate::error::{Error, Result};
use crate::events::{self, IncidentCreated, IncidentDeleted};
use crate::identity::Identity;
use crate::models::{generate_id, now_millis, Category, Incident, NewIncident, Severity, Tally};
use crate::records::Records;

/// Listing page size when the caller gives none.
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Hard cap on one listing page.
pub const MAX_LIST_LIMIT: usize = 500;

/// Listing filter, also used as the `GET /incidents` query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentFilter {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Only incidents whose flag equals this.
    #[serde(default)]
    pub flagged: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl IncidentFilter {
    fn matches(&self, incident: &Incident) -> bool {
        self.category.map_or(true, |c| incident.category == c)
            && self.severity.map_or(true, |s| incident.severity == s)
            && self.flagged.map_or(true, |f| incident.is_flagged == f)
    }

    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// An incident together with its current tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    #[serde(flatten)]
    pub incident: Incident,
    pub tally: Tally,
}

/// Dependents removed by one cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cascade {
    pub votes: usize,
    pub reports: usize,
    pub comments: usize,
}

#[derive(Debug, Clone)]
pub struct IncidentManager {
    records: Records,
    broker: Broker,
}

impl IncidentManager {
    pub fn new(records: Records, broker: Broker) -> Self {
        Self { records, broker }
    }

    /// Validate, persist and announce a new incident.
    pub async fn create_incident(&self, author: &Identity, fields: NewIncident) -> Result<Incident> {
        let id = generate_id(format!("incident:{}:{}", author.id, fields.title).as_bytes());
        let incident = fields.into_incident(id, &author.id, now_millis())?;

        let stored = incident.clone();
        self.records
            .mutate("put_incident", move |s, commit| s.put_incident(&stored, commit))
            .await?;

        info!(
            incident_id = %incident.id,
            author = %author.id,
            category = ?incident.category,
            "incident created"
        );

        events::publish(
            &self.broker,
            [Topic::Feed],
            EventName::IncidentCreated,
            &IncidentCreated {
                incident: &incident,
                tally: Tally::default(),
            },
        );

        Ok(incident)
    }

    pub async fn get_incident(&self, incident_id: &str) -> Result<IncidentSummary> {
        let incident = self.records.require_incident(incident_id).await?;
        let id = incident_id.to_string();
        let tally = self.records.run("tally", move |s| s.tally(&id)).await?;
        Ok(IncidentSummary { incident, tally })
    }

    /// Newest first, filtered and capped.
    pub async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<IncidentSummary>> {
        self.records
            .run("list_incidents", move |s| {
                let mut incidents: Vec<Incident> = s
                    .list_incidents()?
                    .into_iter()
                    .filter(|i| filter.matches(i))
                    .collect();
                incidents.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
                incidents.truncate(filter.limit());

                incidents
                    .into_iter()
                    .map(|incident| {
                        let tally = s.tally(&incident.id)?;
                        Ok(IncidentSummary { incident, tally })
                    })
                    .collect()
            })
            .await
    }

    /// Delete an incident and everything that references it.
    ///
    /// Dependents go first and concurrently; the incident record is removed
    /// only once all three collections are cleared. A crash in between leaves
    /// orphans that [`sweep_orphans`](crate::sweep::sweep_orphans) removes.
    pub async fn delete_incident(&self, incident_id: &str, caller: &Identity) -> Result<Cascade> {
        let incident = self.records.require_incident(incident_id).await?;
        if !caller.can_manage(&incident.author_id) {
            return Err(Error::Forbidden(
                "only the author or a moderator can delete this incident".into(),
            ));
        }

        let cascade = self.delete_dependents(incident_id).await?;
        let id = incident_id.to_string();
        let removed = self
            .records
            .mutate("delete_incident", move |s, commit| s.delete_incident(&id, commit))
            .await?;
        if !removed {
            // A concurrent delete got there first and announced it.
            return Err(Error::incident_not_found(incident_id));
        }

        info!(
            incident_id,
            caller = %caller.id,
            votes = cascade.votes,
            reports = cascade.reports,
            comments = cascade.comments,
            "incident deleted"
        );

        events::publish(
            &self.broker,
            Topic::feed_and_incident(incident_id),
            EventName::IncidentDeleted,
            &IncidentDeleted { incident_id },
        );

        Ok(cascade)
    }

    pub(crate) async fn delete_dependents(&self, incident_id: &str) -> Result<Cascade> {
        let (v, r, c) = (
            incident_id.to_string(),
            incident_id.to_string(),
            incident_id.to_string(),
        );
        let (votes, reports, comments) = tokio::join!(
            self.records
                .mutate("delete_votes", move |s, commit| s.delete_votes_for(&v, commit)),
            self.records
                .mutate("delete_reports", move |s, commit| s.delete_reports_for(&r, commit)),
            self.records
                .mutate("delete_comments", move |s, commit| s.delete_comments_for(&c, commit)),
        );
        Ok(Cascade {
            votes: votes?,
            reports: reports?,
            comments: comments?,
        })
    }
}
