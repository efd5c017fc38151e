//! Record store for incidents and their dependents.
//!
//! Four collections keyed by identifier: incidents, votes, false reports and
//! comments. Votes and reports carry a compound uniqueness constraint over
//! (incident, actor) that the store itself enforces, so two racing inserts
//! for the same pair leave exactly one record and the loser sees
//! [`Error::Conflict`](crate::error::Error::Conflict).
//!
//! Implementations are synchronous; [`Records`](crate::records::Records)
//! runs them on the blocking pool under a timeout. Every mutating call takes
//! a [`Commit`] and must pass [`Commit::begin`] before its write becomes
//! visible, so a call whose caller has already given up leaves no trace.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{Comment, FalseReport, Incident, Tally, Vote, VoteKind};

const OPEN: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Commit point shared by one mutating store call and the task awaiting it.
///
/// Exactly one side wins: either the store passes [`begin`](Self::begin) and
/// its write lands, or the waiter [`abandon`](Self::abandon)s first and the
/// store rolls back.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    state: Arc<AtomicU8>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to make the write durable.
    pub fn begin(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(OPEN, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(COMMITTING) => Ok(()),
            Err(_) => Err(Error::Transient(
                "store call abandoned before commit".into(),
            )),
        }
    }

    /// Give up on the call. Returns `false` if the store already began
    /// committing, in which case its result is final and must be awaited.
    pub fn abandon(&self) -> bool {
        match self
            .state
            .compare_exchange(OPEN, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(ABANDONED) => true,
            Err(_) => false,
        }
    }
}

/// Result of filing a report: the incident after the write, and whether this
/// report is the one that raised the flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagChange {
    pub incident: Incident,
    pub newly_flagged: bool,
}

/// Storage backend for Vigil records.
pub trait RecordStore: Send + Sync {
    // --- Incidents ---

    /// Insert or overwrite an incident.
    fn put_incident(&self, incident: &Incident, commit: &Commit) -> Result<()>;

    fn get_incident(&self, id: &str) -> Result<Option<Incident>>;

    fn list_incidents(&self) -> Result<Vec<Incident>>;

    /// Returns whether the incident existed.
    fn delete_incident(&self, id: &str, commit: &Commit) -> Result<bool>;

    /// Atomically overwrite the moderation flags. `None` if the incident is gone.
    fn set_moderation(
        &self,
        id: &str,
        is_flagged: bool,
        verified_false: bool,
        commit: &Commit,
    ) -> Result<Option<Incident>>;

    // --- Votes ---

    /// Insert a vote; `Conflict` if the (incident, voter) pair already has one,
    /// `NotFound` if the incident is gone.
    fn insert_vote(&self, vote: &Vote, commit: &Commit) -> Result<()>;

    fn get_vote(&self, incident_id: &str, voter_id: &str) -> Result<Option<Vote>>;

    /// Overwrite the kind of an existing vote. `None` if it vanished.
    fn update_vote_kind(
        &self,
        incident_id: &str,
        voter_id: &str,
        kind: VoteKind,
        commit: &Commit,
    ) -> Result<Option<Vote>>;

    /// Returns whether a vote was removed.
    fn delete_vote(&self, incident_id: &str, voter_id: &str, commit: &Commit) -> Result<bool>;

    fn list_votes(&self, incident_id: &str) -> Result<Vec<Vote>>;

    /// Count votes for an incident. Never cached.
    fn tally(&self, incident_id: &str) -> Result<Tally> {
        Ok(Tally::from_kinds(
            self.list_votes(incident_id)?.into_iter().map(|v| v.kind),
        ))
    }

    fn delete_votes_for(&self, incident_id: &str, commit: &Commit) -> Result<usize>;

    // --- False reports ---

    /// Insert a report and raise the incident's flag in one atomic write.
    ///
    /// `Conflict` if the reporter already reported this incident, `NotFound`
    /// if the incident is gone. The flag is only raised when the incident is
    /// neither flagged nor already verified false.
    fn insert_report_and_flag(&self, report: &FalseReport, commit: &Commit) -> Result<FlagChange>;

    fn get_report(&self, incident_id: &str, reporter_id: &str) -> Result<Option<FalseReport>>;

    fn list_reports(&self, incident_id: &str) -> Result<Vec<FalseReport>>;

    fn delete_reports_for(&self, incident_id: &str, commit: &Commit) -> Result<usize>;

    // --- Comments ---

    /// Insert or overwrite a comment; `NotFound` if the incident is gone.
    fn put_comment(&self, comment: &Comment, commit: &Commit) -> Result<()>;

    fn get_comment(&self, incident_id: &str, comment_id: &str) -> Result<Option<Comment>>;

    fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>>;

    fn delete_comment(&self, incident_id: &str, comment_id: &str, commit: &Commit) -> Result<bool>;

    fn delete_comments_for(&self, incident_id: &str, commit: &Commit) -> Result<usize>;

    // --- Maintenance ---

    /// Every incident id referenced by at least one vote, report or comment.
    fn referenced_incident_ids(&self) -> Result<BTreeSet<String>>;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every [`RecordStore`] must share.

    use super::*;
    use crate::models::{Category, Location, Severity};

    pub fn incident(id: &str, author: &str) -> Incident {
        Incident {
            id: id.to_string(),
            title: format!("incident {id}"),
            description: String::new(),
            location: Location {
                address: "1 Main St".into(),
                latitude: 0.0,
                longitude: 0.0,
            },
            category: Category::Other,
            severity: Severity::Medium,
            created_at: 1,
            author_id: author.to_string(),
            image_url: None,
            is_flagged: false,
            verified_false: false,
        }
    }

    fn report(incident_id: &str, reporter: &str) -> FalseReport {
        FalseReport {
            id: format!("r-{reporter}"),
            incident_id: incident_id.to_string(),
            reporter_id: reporter.to_string(),
            reason: "spam".into(),
            created_at: 2,
        }
    }

    fn comment(incident_id: &str, id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            incident_id: incident_id.to_string(),
            author_id: "carol".into(),
            text: "seen it".into(),
            created_at: 3,
            parent_id: None,
        }
    }

    fn put(store: &dyn RecordStore, id: &str) {
        store.put_incident(&incident(id, "alice"), &Commit::new()).unwrap();
    }

    fn vote(store: &dyn RecordStore, id: &str, incident_id: &str, voter: &str, kind: VoteKind) -> Result<()> {
        store.insert_vote(&Vote::new(id.into(), incident_id, voter, kind), &Commit::new())
    }

    pub fn incident_roundtrip(store: &dyn RecordStore) {
        let inc = incident("aa01", "alice");
        store.put_incident(&inc, &Commit::new()).unwrap();
        assert_eq!(store.get_incident("aa01").unwrap(), Some(inc));
        assert_eq!(store.list_incidents().unwrap().len(), 1);
        assert!(store.delete_incident("aa01", &Commit::new()).unwrap());
        assert!(!store.delete_incident("aa01", &Commit::new()).unwrap());
        assert!(store.get_incident("aa01").unwrap().is_none());
    }

    pub fn vote_pair_is_unique(store: &dyn RecordStore) {
        put(store, "bb01");
        vote(store, "v1", "bb01", "bob", VoteKind::Up).unwrap();

        assert!(matches!(
            vote(store, "v2", "bb01", "bob", VoteKind::Down),
            Err(Error::Conflict(_))
        ));
        assert_eq!(
            store.list_votes("bb01").unwrap(),
            vec![Vote::new("v1".into(), "bb01", "bob", VoteKind::Up)]
        );

        let updated = store
            .update_vote_kind("bb01", "bob", VoteKind::Down, &Commit::new())
            .unwrap()
            .unwrap();
        assert_eq!(updated.kind, VoteKind::Down);
        assert_eq!(updated.id, "v1");
        assert_eq!(store.tally("bb01").unwrap(), Tally::new(0, 1));

        assert!(store.delete_vote("bb01", "bob", &Commit::new()).unwrap());
        assert!(!store.delete_vote("bb01", "bob", &Commit::new()).unwrap());
        assert!(store
            .update_vote_kind("bb01", "bob", VoteKind::Up, &Commit::new())
            .unwrap()
            .is_none());
    }

    pub fn votes_scoped_by_incident(store: &dyn RecordStore) {
        put(store, "cc01");
        put(store, "cc02");
        vote(store, "v1", "cc01", "bob", VoteKind::Up).unwrap();
        vote(store, "v2", "cc02", "bob", VoteKind::Down).unwrap();
        vote(store, "v3", "cc02", "carol", VoteKind::Down).unwrap();

        assert_eq!(store.tally("cc01").unwrap(), Tally::new(1, 0));
        assert_eq!(store.tally("cc02").unwrap(), Tally::new(0, 2));
        assert_eq!(store.delete_votes_for("cc02", &Commit::new()).unwrap(), 2);
        assert_eq!(store.tally("cc02").unwrap(), Tally::default());
        assert_eq!(store.tally("cc01").unwrap(), Tally::new(1, 0));
    }

    pub fn dependents_need_their_incident(store: &dyn RecordStore) {
        assert!(matches!(
            vote(store, "v1", "zz01", "bob", VoteKind::Up),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.put_comment(&comment("zz01", "c1"), &Commit::new()),
            Err(Error::NotFound(_))
        ));
        assert!(store.referenced_incident_ids().unwrap().is_empty());
    }

    pub fn report_flags_atomically(store: &dyn RecordStore) {
        put(store, "dd01");

        let change = store
            .insert_report_and_flag(&report("dd01", "dave"), &Commit::new())
            .unwrap();
        assert!(change.newly_flagged);
        assert!(change.incident.is_flagged);

        let change = store
            .insert_report_and_flag(&report("dd01", "erin"), &Commit::new())
            .unwrap();
        assert!(!change.newly_flagged);

        assert!(matches!(
            store.insert_report_and_flag(&report("dd01", "dave"), &Commit::new()),
            Err(Error::Conflict(_))
        ));
        assert_eq!(store.list_reports("dd01").unwrap().len(), 2);

        assert!(matches!(
            store.insert_report_and_flag(&report("missing", "dave"), &Commit::new()),
            Err(Error::NotFound(_))
        ));
        assert!(store.get_report("missing", "dave").unwrap().is_none());
    }

    pub fn verified_false_is_not_reflagged(store: &dyn RecordStore) {
        put(store, "ee01");
        store
            .set_moderation("ee01", false, true, &Commit::new())
            .unwrap()
            .unwrap();

        let change = store
            .insert_report_and_flag(&report("ee01", "frank"), &Commit::new())
            .unwrap();
        assert!(!change.newly_flagged);
        assert!(!change.incident.is_flagged);
        assert!(change.incident.verified_false);
        assert!(store.get_report("ee01", "frank").unwrap().is_some());
    }

    pub fn set_moderation_on_missing(store: &dyn RecordStore) {
        assert!(store
            .set_moderation("nope", false, true, &Commit::new())
            .unwrap()
            .is_none());
    }

    pub fn comments_and_cascade(store: &dyn RecordStore) {
        put(store, "ff01");
        store.put_comment(&comment("ff01", "c1"), &Commit::new()).unwrap();
        store.put_comment(&comment("ff01", "c2"), &Commit::new()).unwrap();
        assert_eq!(store.list_comments("ff01").unwrap().len(), 2);
        assert!(store.get_comment("ff01", "c1").unwrap().is_some());
        assert!(store.delete_comment("ff01", "c1", &Commit::new()).unwrap());
        assert!(!store.delete_comment("ff01", "c1", &Commit::new()).unwrap());
        assert!(store.get_comment("ff01", "c1").unwrap().is_none());
        assert_eq!(store.delete_comments_for("ff01", &Commit::new()).unwrap(), 1);
        assert!(store.list_comments("ff01").unwrap().is_empty());
    }

    pub fn referenced_ids(store: &dyn RecordStore) {
        put(store, "gg01");
        put(store, "gg02");
        vote(store, "v", "gg01", "bob", VoteKind::Up).unwrap();
        store.put_comment(&comment("gg02", "c"), &Commit::new()).unwrap();
        assert!(store.delete_incident("gg02", &Commit::new()).unwrap());

        let ids = store.referenced_incident_ids().unwrap();
        assert!(ids.contains("gg01"));
        assert!(ids.contains("gg02"));
        assert_eq!(store.delete_reports_for("gg01", &Commit::new()).unwrap(), 0);
    }

    pub fn abandoned_commit_writes_nothing(store: &dyn RecordStore) {
        put(store, "jj01");
        let commit = Commit::new();
        assert!(commit.abandon());

        let err = store
            .insert_vote(&Vote::new("v".into(), "jj01", "bob", VoteKind::Up), &commit)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.list_votes("jj01").unwrap().is_empty());

        assert!(store
            .insert_report_and_flag(&report("jj01", "dave"), &commit)
            .is_err());
        assert!(store.list_reports("jj01").unwrap().is_empty());
        assert!(!store.get_incident("jj01").unwrap().unwrap().is_flagged);

        assert!(store.delete_incident("jj01", &commit).is_err());
        assert!(store.get_incident("jj01").unwrap().is_some());
    }

    pub fn concurrent_inserts_leave_one_vote(store: Arc<dyn RecordStore>) {
        put(store.as_ref(), "hh01");
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    vote(store.as_ref(), &format!("v{n}"), "hh01", "bob", VoteKind::Up)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Conflict(_) | Error::Transient(_))));
        assert_eq!(store.list_votes("hh01").unwrap().len(), 1);
    }

    #[test]
    fn commit_has_one_winner() {
        let commit = Commit::new();
        assert!(commit.begin().is_ok());
        assert!(!commit.abandon());
        assert!(commit.begin().is_ok());

        let late = Commit::new();
        assert!(late.abandon());
        assert!(late.abandon());
        assert!(matches!(late.begin(), Err(Error::Transient(_))));
    }
}
