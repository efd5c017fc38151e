//! Orphan sweep.
//!
//! Cascade deletion is not transactional across collections. If a node dies
//! between clearing dependents and removing the incident, or a dependent is
//! written while its incident is being deleted, records can be left pointing
//! at an incident that no longer exists. The sweep finds those and removes
//! them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Incident ids referenced by at least one dependent.
    pub scanned: usize,
    /// Referenced ids whose incident is gone.
    pub orphaned_incidents: Vec<String>,
    pub votes: usize,
    pub reports: usize,
    pub comments: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.votes + self.reports + self.comments
    }
}

/// Delete every vote, report and comment whose incident no longer exists.
pub async fn sweep_orphans(engine: &Engine) -> Result<SweepReport> {
    let records = engine.records();
    let (scanned, orphaned) = records
        .run("find_orphans", |s| {
            let referenced = s.referenced_incident_ids()?;
            let scanned = referenced.len();
            let mut orphaned = Vec::new();
            for id in referenced {
                if s.get_incident(&id)?.is_none() {
                    orphaned.push(id);
                }
            }
            Ok((scanned, orphaned))
        })
        .await?;
    debug!(scanned, orphaned = orphaned.len(), "orphan scan complete");

    let mut report = SweepReport {
        scanned,
        ..Default::default()
    };
    for id in &orphaned {
        let cascade = engine.incidents.delete_dependents(id).await?;
        report.votes += cascade.votes;
        report.reports += cascade.reports;
        report.comments += cascade.comments;
    }
    report.orphaned_incidents = orphaned;

    if report.removed() > 0 {
        info!(
            incidents = report.orphaned_incidents.len(),
            votes = report.votes,
            reports = report.reports,
            comments = report.comments,
            "removed orphaned records"
        );
    }
    Ok(report)
}

/// Run [`sweep_orphans`] every `interval` until the task is aborted.
pub fn spawn_sweeper(engine: Engine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_orphans(&engine).await {
                error!(error = %e, "orphan sweep failed");
            }
        }
    })
}
