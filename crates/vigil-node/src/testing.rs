//! Shared fixtures for engine tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vigil_broker::{Broker, Envelope, Subscriber};

use crate::engine::Engine;
use crate::error::Result;
use crate::identity::Identity;
use crate::models::{
    Category, Comment, FalseReport, Incident, Location, NewIncident, Vote, VoteKind,
};
use crate::records::DEFAULT_STORE_TIMEOUT;
use crate::storage::{Commit, FlagChange, MemoryStore, RecordStore};

pub(crate) struct Harness {
    pub engine: Engine,
    pub broker: Broker,
    pub store: Arc<MemoryStore>,
}

pub(crate) fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broker = Broker::new(64);
    let engine = Engine::new(store.clone(), broker.clone(), DEFAULT_STORE_TIMEOUT);
    Harness {
        engine,
        broker,
        store,
    }
}

pub(crate) fn new_incident(title: &str) -> NewIncident {
    NewIncident {
        title: title.to_string(),
        description: "reported from the corner shop".into(),
        location: Location {
            address: "12 Harbour Road".into(),
            latitude: 51.5,
            longitude: -0.12,
        },
        category: Category::Utility,
        severity: None,
        image_url: None,
    }
}

pub(crate) async fn seed_incident(h: &Harness, author: &str) -> Incident {
    h.engine
        .incidents
        .create_incident(&Identity::user(author), new_incident("Streetlight out"))
        .await
        .unwrap()
}

/// Everything queued for a subscriber right now.
pub(crate) fn drain(sub: &mut Subscriber) -> Vec<Arc<Envelope>> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

/// Memory store with switchable faults.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: MemoryStore,
    /// Stall every `insert_vote` this long before it reaches the store.
    insert_vote_delay_ms: AtomicU64,
    /// Answer `get_incident` for ids that are not stored, as if the incident
    /// vanished right after being looked up.
    phantom_incidents: AtomicBool,
}

impl FlakyStore {
    pub fn stall_vote_inserts(&self, delay: Duration) {
        self.insert_vote_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn phantom_incidents(&self, on: bool) {
        self.phantom_incidents.store(on, Ordering::SeqCst);
    }
}

impl RecordStore for FlakyStore {
    fn put_incident(&self, incident: &Incident, commit: &Commit) -> Result<()> {
        self.inner.put_incident(incident, commit)
    }

    fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let found = self.inner.get_incident(id)?;
        if found.is_none() && self.phantom_incidents.load(Ordering::SeqCst) {
            return Ok(Some(crate::storage::conformance::incident(id, "ghost")));
        }
        Ok(found)
    }

    fn list_incidents(&self) -> Result<Vec<Incident>> {
        self.inner.list_incidents()
    }

    fn delete_incident(&self, id: &str, commit: &Commit) -> Result<bool> {
        self.inner.delete_incident(id, commit)
    }

    fn set_moderation(
        &self,
        id: &str,
        is_flagged: bool,
        verified_false: bool,
        commit: &Commit,
    ) -> Result<Option<Incident>> {
        self.inner.set_moderation(id, is_flagged, verified_false, commit)
    }

    fn insert_vote(&self, vote: &Vote, commit: &Commit) -> Result<()> {
        let delay = self.insert_vote_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.inner.insert_vote(vote, commit)
    }

    fn get_vote(&self, incident_id: &str, voter_id: &str) -> Result<Option<Vote>> {
        self.inner.get_vote(incident_id, voter_id)
    }

    fn update_vote_kind(
        &self,
        incident_id: &str,
        voter_id: &str,
        kind: VoteKind,
        commit: &Commit,
    ) -> Result<Option<Vote>> {
        self.inner.update_vote_kind(incident_id, voter_id, kind, commit)
    }

    fn delete_vote(&self, incident_id: &str, voter_id: &str, commit: &Commit) -> Result<bool> {
        self.inner.delete_vote(incident_id, voter_id, commit)
    }

    fn list_votes(&self, incident_id: &str) -> Result<Vec<Vote>> {
        self.inner.list_votes(incident_id)
    }

    fn delete_votes_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.inner.delete_votes_for(incident_id, commit)
    }

    fn insert_report_and_flag(&self, report: &FalseReport, commit: &Commit) -> Result<FlagChange> {
        self.inner.insert_report_and_flag(report, commit)
    }

    fn get_report(&self, incident_id: &str, reporter_id: &str) -> Result<Option<FalseReport>> {
        self.inner.get_report(incident_id, reporter_id)
    }

    fn list_reports(&self, incident_id: &str) -> Result<Vec<FalseReport>> {
        self.inner.list_reports(incident_id)
    }

    fn delete_reports_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.inner.delete_reports_for(incident_id, commit)
    }

    fn put_comment(&self, comment: &Comment, commit: &Commit) -> Result<()> {
        self.inner.put_comment(comment, commit)
    }

    fn get_comment(&self, incident_id: &str, comment_id: &str) -> Result<Option<Comment>> {
        self.inner.get_comment(incident_id, comment_id)
    }

    fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>> {
        self.inner.list_comments(incident_id)
    }

    fn delete_comment(&self, incident_id: &str, comment_id: &str, commit: &Commit) -> Result<bool> {
        self.inner.delete_comment(incident_id, comment_id, commit)
    }

    fn delete_comments_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.inner.delete_comments_for(incident_id, commit)
    }

    fn referenced_incident_ids(&self) -> Result<BTreeSet<String>> {
        self.inner.referenced_incident_ids()
    }
}

pub(crate) struct FlakyHarness {
    pub engine: Engine,
    pub broker: Broker,
    pub store: Arc<FlakyStore>,
}

pub(crate) fn flaky_harness(store_timeout: Duration) -> FlakyHarness {
    let store = Arc::new(FlakyStore::default());
    let broker = Broker::new(64);
    let engine = Engine::new(store.clone(), broker.clone(), store_timeout);
    FlakyHarness {
        engine,
        broker,
        store,
    }
}
