//! False-report ledger.

use tracing::{debug, info};
use vigil_broker::{Broker, EventName, Topic};

use crate::error::{Error, Result};
use crate::events::{self, FlagState};
use crate::identity::Identity;
use crate::models::{generate_id, normalize_reason, now_millis, FalseReport, ReportStatus};
use crate::records::Records;

#[derive(Debug, Clone)]
pub struct ReportLedger {
    records: Records,
    broker: Broker,
}

impl ReportLedger {
    pub fn new(records: Records, broker: Broker) -> Self {
        Self { records, broker }
    }

    /// File a false-flag report. Flags the incident if it is not already.
    ///
    /// Checks run in a fixed order: missing incident, self-report, reason,
    /// duplicate. A self-report therefore fails `Forbidden` even when the
    /// author somehow already has a report on record.
    pub async fn file_report(
        &self,
        incident_id: &str,
        reporter: &Identity,
        reason: Option<String>,
    ) -> Result<FalseReport> {
        let incident = self.records.require_incident(incident_id).await?;
        if incident.author_id == reporter.id {
            return Err(Error::Forbidden(
                "you cannot report your own incident".into(),
            ));
        }
        let reason = normalize_reason(reason)?;

        let report = FalseReport {
            id: generate_id(format!("report:{incident_id}:{}", reporter.id).as_bytes()),
            incident_id: incident_id.to_string(),
            reporter_id: reporter.id.clone(),
            reason,
            created_at: now_millis(),
        };

        let stored = report.clone();
        let change = self
            .records
            .mutate("insert_report", move |s, commit| {
                s.insert_report_and_flag(&stored, commit)
            })
            .await?;

        debug!(incident_id, reporter = %reporter.id, report_id = %report.id, "false report filed");

        if change.newly_flagged {
            info!(incident_id, "incident flagged");
            events::publish(
                &self.broker,
                Topic::feed_and_incident(incident_id),
                EventName::IncidentFlagged,
                &FlagState::of(&change.incident),
            );
        }

        Ok(report)
    }

    /// Whether `reporter_id` has reported the incident. Pure read.
    pub async fn get_report_status(
        &self,
        incident_id: &str,
        reporter_id: &str,
    ) -> Result<ReportStatus> {
        self.records.require_incident(incident_id).await?;
        let (id, reporter) = (incident_id.to_string(), reporter_id.to_string());
        let report = self
            .records
            .run("get_report", move |s| s.get_report(&id, &reporter))
            .await?;
        Ok(ReportStatus {
            has_reported: report.is_some(),
            report,
        })
    }

    /// Every report on an incident, oldest first. Moderators only.
    pub async fn list_reports(&self, incident_id: &str, caller: &Identity) -> Result<Vec<FalseReport>> {
        caller.require_moderator("listing reports")?;
        self.records.require_incident(incident_id).await?;
        let id = incident_id.to_string();
        self.records
            .run("list_reports", move |s| s.list_reports(&id))
            .await
    }
}
