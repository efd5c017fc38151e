//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! ```text
//! incident:{id}
//! vote:{incident}:{voter}
//! report:{incident}:{reporter}
//! comment:{incident}:{comment}
//! ```
//!
//! The compound keys are the uniqueness constraint. Inserts run in a
//! pessimistic transaction that locks the key with `get_for_update`, so a
//! concurrent insert of the same pair waits for the first to commit and then
//! sees the existing record. Vote and comment inserts also lock their
//! incident key, which orders them against the incident's own deletion.
//!
//! Every write goes through a transaction that only commits after
//! [`Commit::begin`]; an abandoned call drops its transaction, which rolls
//! it back.

use std::collections::BTreeSet;
use std::path::Path;

use rocksdb::{Direction, IteratorMode, Options, Transaction, TransactionDB, TransactionDBOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Commit, FlagChange, RecordStore};
use crate::error::{Error, Result};
use crate::models::{Comment, FalseReport, Incident, Vote, VoteKind};

/// RocksDB-backed record store.
pub struct RocksStore {
    db: TransactionDB,
}

fn incident_key(id: &str) -> String {
    format!("{}:{}", Incident::KEY_PREFIX, id)
}

fn pair_key(prefix: &str, incident_id: &str, actor: &str) -> String {
    format!("{prefix}:{incident_id}:{actor}")
}

fn scope_prefix(prefix: &str, incident_id: &str) -> String {
    format!("{prefix}:{incident_id}:")
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let txn_opts = TransactionDBOptions::default();
        let db = TransactionDB::open(&opts, &txn_opts, path)?;
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T, commit: &Commit) -> Result<()> {
        let txn = self.db.transaction();
        txn.put(key.as_bytes(), serde_json::to_vec(value)?)?;
        commit_txn(txn, commit)
    }


    /// Visit every key/value under `prefix`, in key order.
    fn scan(&self, prefix: &str, mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        let prefix = prefix.as_bytes();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            visit(&key, &value)?;
        }
        Ok(())
    }

    fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.scan(prefix, |_, value| {
            out.push(serde_json::from_slice(value)?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Delete every key under `prefix` in one transaction.
    fn delete_prefix(&self, prefix: &str, commit: &Commit) -> Result<usize> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        self.scan(prefix, |key, _| {
            keys.push(key.to_vec());
            Ok(())
        })?;
        if keys.is_empty() {
            return Ok(0);
        }
        let txn = self.db.transaction();
        for key in &keys {
            txn.delete(key)?;
        }
        commit_txn(txn, commit)?;
        Ok(keys.len())
    }

    fn delete_key(&self, key: &str, commit: &Commit) -> Result<bool> {
        let txn = self.db.transaction();
        let existed = txn.get_for_update(key.as_bytes(), true)?.is_some();
        if existed {
            txn.delete(key.as_bytes())?;
            commit_txn(txn, commit)?;
        }
        Ok(existed)
    }
}

/// Lock an incident key inside `txn`, failing if the incident is gone.
fn lock_incident(txn: &Transaction<'_, TransactionDB>, incident_id: &str) -> Result<()> {
    match txn.get_for_update(incident_key(incident_id).as_bytes(), true)? {
        Some(_) => Ok(()),
        None => Err(Error::incident_not_found(incident_id)),
    }
}

/// Commit `txn` if the caller is still waiting. Dropping an uncommitted
/// transaction rolls it back.
fn commit_txn(txn: Transaction<'_, TransactionDB>, commit: &Commit) -> Result<()> {
    commit.begin()?;
    txn.commit()?;
    Ok(())
}

impl RecordStore for RocksStore {
    // --- Incidents ---

    fn put_incident(&self, incident: &Incident, commit: &Commit) -> Result<()> {
        self.put_json(&incident_key(&incident.id), incident, commit)
    }

    fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        self.get_json(&incident_key(id))
    }

    fn list_incidents(&self) -> Result<Vec<Incident>> {
        self.list_json(&format!("{}:", Incident::KEY_PREFIX))
    }

    fn delete_incident(&self, id: &str, commit: &Commit) -> Result<bool> {
        self.delete_key(&incident_key(id), commit)
    }

    fn set_moderation(
        &self,
        id: &str,
        is_flagged: bool,
        verified_false: bool,
        commit: &Commit,
    ) -> Result<Option<Incident>> {
        let key = incident_key(id);
        let txn = self.db.transaction();
        let mut incident: Incident = match txn.get_for_update(key.as_bytes(), true)? {
            Some(data) => serde_json::from_slice(&data)?,
            None => return Ok(None),
        };
        incident.is_flagged = is_flagged;
        incident.verified_false = verified_false;
        txn.put(key.as_bytes(), serde_json::to_vec(&incident)?)?;
        commit_txn(txn, commit)?;
        Ok(Some(incident))
    }

    // --- Votes ---

    fn insert_vote(&self, vote: &Vote, commit: &Commit) -> Result<()> {
        let key = pair_key(Vote::KEY_PREFIX, &vote.incident_id, &vote.voter_id);
        let txn = self.db.transaction();
        if txn.get_for_update(key.as_bytes(), true)?.is_some() {
            return Err(Error::Conflict(format!(
                "{} already voted on incident {}",
                vote.voter_id, vote.incident_id
            )));
        }
        lock_incident(&txn, &vote.incident_id)?;
        txn.put(key.as_bytes(), serde_json::to_vec(vote)?)?;
        commit_txn(txn, commit)
    }

    fn get_vote(&self, incident_id: &str, voter_id: &str) -> Result<Option<Vote>> {
        self.get_json(&pair_key(Vote::KEY_PREFIX, incident_id, voter_id))
    }

    fn update_vote_kind(
        &self,
        incident_id: &str,
        voter_id: &str,
        kind: VoteKind,
        commit: &Commit,
    ) -> Result<Option<Vote>> {
        let key = pair_key(Vote::KEY_PREFIX, incident_id, voter_id);
        let txn = self.db.transaction();
        let mut vote: Vote = match txn.get_for_update(key.as_bytes(), true)? {
            Some(data) => serde_json::from_slice(&data)?,
            None => return Ok(None),
        };
        vote.kind = kind;
        txn.put(key.as_bytes(), serde_json::to_vec(&vote)?)?;
        commit_txn(txn, commit)?;
        Ok(Some(vote))
    }

    fn delete_vote(&self, incident_id: &str, voter_id: &str, commit: &Commit) -> Result<bool> {
        self.delete_key(&pair_key(Vote::KEY_PREFIX, incident_id, voter_id), commit)
    }

    fn list_votes(&self, incident_id: &str) -> Result<Vec<Vote>> {
        self.list_json(&scope_prefix(Vote::KEY_PREFIX, incident_id))
    }

    fn delete_votes_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.delete_prefix(&scope_prefix(Vote::KEY_PREFIX, incident_id), commit)
    }

    // --- False reports ---

    fn insert_report_and_flag(&self, report: &FalseReport, commit: &Commit) -> Result<FlagChange> {
        let report_key = pair_key(FalseReport::KEY_PREFIX, &report.incident_id, &report.reporter_id);
        let incident_key = incident_key(&report.incident_id);

        let txn = self.db.transaction();
        if txn.get_for_update(report_key.as_bytes(), true)?.is_some() {
            return Err(Error::Conflict(format!(
                "{} already reported incident {}",
                report.reporter_id, report.incident_id
            )));
        }
        let mut incident: Incident = match txn.get_for_update(incident_key.as_bytes(), true)? {
            Some(data) => serde_json::from_slice(&data)?,
            None => return Err(Error::incident_not_found(&report.incident_id)),
        };

        txn.put(report_key.as_bytes(), serde_json::to_vec(report)?)?;
        let newly_flagged = !incident.is_flagged && !incident.verified_false;
        if newly_flagged {
            incident.is_flagged = true;
            txn.put(incident_key.as_bytes(), serde_json::to_vec(&incident)?)?;
        }
        commit_txn(txn, commit)?;

        Ok(FlagChange {
            incident,
            newly_flagged,
        })
    }

    fn get_report(&self, incident_id: &str, reporter_id: &str) -> Result<Option<FalseReport>> {
        self.get_json(&pair_key(FalseReport::KEY_PREFIX, incident_id, reporter_id))
    }

    fn list_reports(&self, incident_id: &str) -> Result<Vec<FalseReport>> {
        let mut reports: Vec<FalseReport> =
            self.list_json(&scope_prefix(FalseReport::KEY_PREFIX, incident_id))?;
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }

    fn delete_reports_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.delete_prefix(&scope_prefix(FalseReport::KEY_PREFIX, incident_id), commit)
    }

    // --- Comments ---

    fn put_comment(&self, comment: &Comment, commit: &Commit) -> Result<()> {
        let key = pair_key(Comment::KEY_PREFIX, &comment.incident_id, &comment.id);
        let txn = self.db.transaction();
        lock_incident(&txn, &comment.incident_id)?;
        txn.put(key.as_bytes(), serde_json::to_vec(comment)?)?;
        commit_txn(txn, commit)
    }

    fn get_comment(&self, incident_id: &str, comment_id: &str) -> Result<Option<Comment>> {
        self.get_json(&pair_key(Comment::KEY_PREFIX, incident_id, comment_id))
    }

    fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> =
            self.list_json(&scope_prefix(Comment::KEY_PREFIX, incident_id))?;
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    fn delete_comment(&self, incident_id: &str, comment_id: &str, commit: &Commit) -> Result<bool> {
        self.delete_key(&pair_key(Comment::KEY_PREFIX, incident_id, comment_id), commit)
    }

    fn delete_comments_for(&self, incident_id: &str, commit: &Commit) -> Result<usize> {
        self.delete_prefix(&scope_prefix(Comment::KEY_PREFIX, incident_id), commit)
    }

    // --- Maintenance ---

    fn referenced_incident_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for prefix in [Vote::KEY_PREFIX, FalseReport::KEY_PREFIX, Comment::KEY_PREFIX] {
            let scope = format!("{prefix}:");
            self.scan(&scope, |key, _| {
                let rest = &key[scope.len()..];
                let key_str = String::from_utf8_lossy(rest);
                if let Some((incident_id, _)) = key_str.split_once(':') {
                    ids.insert(incident_id.to_string());
                }
                Ok(())
            })?;
        }
        Ok(ids)
    }
}
