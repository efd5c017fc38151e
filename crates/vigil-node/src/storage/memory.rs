//! In-process record store.
//!
//! Holds everything in ordered maps behind one lock. Used by tests and by
//! nodes started with `VIGIL_STORE=memory`; nothing survives a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Commit, FlagChange, RecordStore};
use crate::error::{Error, Result};
use crate::models::{Comment, FalseReport, Incident, Vote, VoteKind};

type PairKey = (String, String);

#[derive(Default)]
struct Tables {
    incidents: HashMap<String, Incident>,
    votes: BTreeMap<PairKey, Vote>,
    reports: BTreeMap<PairKey, FalseReport>,
    comments: BTreeMap<PairKey, Comment>,
}

fn pair(incident_id: &str, actor: &str) -> PairKey {
    (incident_id.to_string(), actor.to_string())
}

fn scoped<'a, V>(
    map: &'a BTreeMap<PairKey, V>,
    incident_id: &'a str,
) -> impl Iterator<Item = &'a V> + 'a {
    map.iter()
        .filter(move |((inc, _), _)| inc == incident_id)
        .map(|(_, v)| v)
}

fn remove_scoped<V>(
    map: &mut BTreeMap<PairKey, V>,
    incident_id: &str,
    commit: &Commit,
) -> Result<usize> {
    if scoped(map, incident_id).next().is_none() {
        return Ok(0);
    }
    commit.begin()?;
    let before = map.len();
    map.retain(|(inc, _), _| inc != incident_id);
    Ok(before - map.len())
}

fn require_incident(tables: &Tables, incident_id: &str) -> Result<()> {
    if tables.incidents.contains_key(incident_id) {
        Ok(())
    } else {
        Err(Error::incident_not_found(incident_id))
    }
}

/// Memory-backed record store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    fn put_incident(&self, incident: &Incident, commit: &Commit) -> Result<()> {
        let mut tables = self.write()?;
        commit.begin()?;
        tables.incidents.insert(incident.id.clone(), incident.clone());
        Ok(())
    }

    fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        Ok(self.read()?.incidents.get(id).cloned())
    }

    fn list_incidents(&self) -> Result<Vec<Incident>> {
        Ok(self.read()?.incidents.values().cloned().collect())
    }

    fn delete_incident(&self, id: &str, commit: &Commit) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.incidents.contains_key(id) {
            return Ok(false);
        }
        commit.begin()?;
        Ok(tables.incidents.remove(id).is_some())
    }

    fn set_moderation(
        &self,
        id: &str,
        is_flagged: bool,
        verified_false: bool,
        commit: &Commit,
    ) -> Result<Option<Incident>> {
        let mut tables = self.write()?;
        let Some(incident) = tables.incidents.get_mut(id) else {
            return Ok(None);
        };
        commit.begin()?;
        incident.is_flagged = is_flagged;
        incident.verified_false = verified_false;
        Ok(Some(incident.clone()))
    }

    fn insert_vote(&self, vote: &Vote, commit: &Commit) -> Result<()> {
        let mut tables = self.write()?;
        let key = pair(&vote.incident_id, &vote.voter_id);
        if tables.votes.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "{} already voted on incident {}",
                vote.voter_id, vote.incident_id
            )));
        }
        require_incident(&tables, &vote.incident_id)?;
        commit.begin()?;
        tables.votes.insert(key, vote.clone());
        Ok(())
    }

    fn get_vote(&self, incident_id: &str, voter_id: &str) -> Result<Option<Vote>> {
        Ok(self.read()?.votes.get(&pair(incident_id, voter_id)).cloned())
    }

    fn update_vote_kind(
        &self,
        incident_id: &str,
        voter_id: &str,
        kind: VoteKind,
        commit: &Commit,
    ) -> Result<Option<Vote>> {
        let mut tables = self.write()?;
        let Some(vote) = tables.votes.get_mut(&pair(incident_id, voter_id)) else {
            return Ok(None);
        };
        commit.begin()?;
        vote.kind = kind;
        Ok(Some(vote.clone()))
    }

    fn delete_vote(&self, incident_id: &str, voter_id: &str, commit: &Commit) -> Result<bool> {
        let mut tables = self.write()?;
        let key = pair(incident_id, voter_id);
        if !tables.votes.contains_key(&key) {
            return Ok(false);
        }
        commit.begin()?;
        Ok(tables.votes.remove(&key).is_some())
    }

    fn list_votes(&self, incident_id: &str) -> Result<Vec<Vote>> {
        Ok(scoped(&self.read()?.votes, incident_id).cloned().collect())
    }

    fn delete_votes_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        remove_scoped(&mut self.write()?.votes, incident_id, commit)
    }

    fn insert_report_and_flag(&self, report: &FalseReport, commit: &Commit) -> Result<FlagChange> {
        let mut tables = self.write()?;
        let key = pair(&report.incident_id, &report.reporter_id);
        if tables.reports.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "{} already reported incident {}",
                report.reporter_id, report.incident_id
            )));
        }
        let incident = tables
            .incidents
            .get_mut(&report.incident_id)
            .ok_or_else(|| Error::incident_not_found(&report.incident_id))?;

        commit.begin()?;
        let newly_flagged = !incident.is_flagged && !incident.verified_false;
        if newly_flagged {
            incident.is_flagged = true;
        }
        let incident = incident.clone();
        tables.reports.insert(key, report.clone());

        Ok(FlagChange {
            incident,
            newly_flagged,
        })
    }

    fn get_report(&self, incident_id: &str, reporter_id: &str) -> Result<Option<FalseReport>> {
        Ok(self
            .read()?
            .reports
            .get(&pair(incident_id, reporter_id))
            .cloned())
    }

    fn list_reports(&self, incident_id: &str) -> Result<Vec<FalseReport>> {
        let mut reports: Vec<FalseReport> =
            scoped(&self.read()?.reports, incident_id).cloned().collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }

    fn delete_reports_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        remove_scoped(&mut self.write()?.reports, incident_id, commit)
    }

    fn put_comment(&self, comment: &Comment, commit: &Commit) -> Result<()> {
        let mut tables = self.write()?;
        require_incident(&tables, &comment.incident_id)?;
        commit.begin()?;
        tables
            .comments
            .insert(pair(&comment.incident_id, &comment.id), comment.clone());
        Ok(())
    }

    fn get_comment(&self, incident_id: &str, comment_id: &str) -> Result<Option<Comment>> {
        Ok(self
            .read()?
            .comments
            .get(&pair(incident_id, comment_id))
            .cloned())
    }

    fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> =
            scoped(&self.read()?.comments, incident_id).cloned().collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    fn delete_comment(&self, incident_id: &str, comment_id: &str, commit: &Commit) -> Result<bool> {
        let mut tables = self.write()?;
        let key = pair(incident_id, comment_id);
        if !tables.comments.contains_key(&key) {
            return Ok(false);
        }
        commit.begin()?;
        Ok(tables.comments.remove(&key).is_some())
    }

    fn delete_comments_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        remove_scoped(&mut self.write()?.comments, incident_id, commit)
    }

    fn referenced_incident_ids(&self) -> Result<BTreeSet<String>> {
        let tables = self.read()?;
        Ok(tables
            .votes
            .keys()
            .chain(tables.reports.keys())
            .chain(tables.comments.keys())
            .map(|(incident_id, _)| incident_id.clone())
            .collect())
    }
}
