//! Comment board - threaded discussion under an incident.

use tracing::debug;
use vigil_broker::{Broker, EventName, Topic};

use crate::error::{Error, Result};
use crate::events::{self, CommentAdded, CommentDeleted};
use crate::identity::Identity;
use crate::models::{generate_id, now_millis, Comment, NewComment};
use crate::records::Records;

#[derive(Debug, Clone)]
pub struct CommentBoard {
    records: Records,
    broker: Broker,
}

impl CommentBoard {
    pub fn new(records: Records, broker: Broker) -> Self {
        Self { records, broker }
    }

    /// Post a comment. A reply's parent must be a comment on the same incident.
    pub async fn add_comment(
        &self,
        incident_id: &str,
        author: &Identity,
        fields: NewComment,
    ) -> Result<Comment> {
        self.records.require_incident(incident_id).await?;

        let id = generate_id(format!("comment:{incident_id}:{}", author.id).as_bytes());
        let comment = fields.into_comment(id, incident_id, &author.id, now_millis())?;

        if let Some(parent_id) = &comment.parent_id {
            let (inc, parent) = (incident_id.to_string(), parent_id.clone());
            let found = self
                .records
                .run("get_comment", move |s| s.get_comment(&inc, &parent))
                .await?;
            if found.is_none() {
                return Err(Error::Validation(format!(
                    "parent comment {parent_id} does not exist on this incident"
                )));
            }
        }

        let stored = comment.clone();
        self.records
            .mutate("put_comment", move |s, commit| s.put_comment(&stored, commit))
            .await?;

        debug!(incident_id, comment_id = %comment.id, author = %author.id, "comment added");

        events::publish(
            &self.broker,
            [Topic::incident(incident_id)],
            EventName::CommentAdded,
            &CommentAdded { comment: &comment },
        );

        Ok(comment)
    }

    /// Oldest first.
    pub async fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>> {
        self.records.require_incident(incident_id).await?;
        let id = incident_id.to_string();
        self.records
            .run("list_comments", move |s| s.list_comments(&id))
            .await
    }

    /// Remove a comment. Authors may delete their own, moderators any.
    /// Replies are left in place.
    pub async fn delete_comment(
        &self,
        incident_id: &str,
        comment_id: &str,
        caller: &Identity,
    ) -> Result<()> {
        let (inc, cid) = (incident_id.to_string(), comment_id.to_string());
        let comment = self
            .records
            .run("get_comment", move |s| s.get_comment(&inc, &cid))
            .await?
            .ok_or_else(|| Error::NotFound(format!("comment {comment_id}")))?;

        if !caller.can_manage(&comment.author_id) {
            return Err(Error::Forbidden(
                "only the author or a moderator can delete this comment".into(),
            ));
        }

        let (inc, cid) = (incident_id.to_string(), comment_id.to_string());
        let removed = self
            .records
            .mutate("delete_comment", move |s, commit| s.delete_comment(&inc, &cid, commit))
            .await?;
        if !removed {
            return Err(Error::NotFound(format!("comment {comment_id}")));
        }

        debug!(incident_id, comment_id, caller = %caller.id, "comment deleted");

        events::publish(
            &self.broker,
            [Topic::incident(incident_id)],
            EventName::CommentDeleted,
            &CommentDeleted {
                incident_id,
                comment_id,
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, harness, seed_incident};

    fn text(body: &str) -> NewComment {
        NewComment {
            text: body.into(),
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn thread_with_reply() {
        let h = harness();
        let incident = seed_incident(&h, "alice").await;
        let mut detail = h.broker.connect();
        detail.join(Topic::incident(&incident.id));
        let mut feed = h.broker.connect();
        feed.join(Topic::Feed);

        let root = h
            .engine
            .comments
            .add_comment(&incident.id, &Identity::user("bob"), text("I saw this too"))
            .await
            .unwrap();
        let reply = h
            .engine
            .comments
            .add_comment(
                &incident.id,
                &Identity::user("carol"),
                NewComment {
                    text: "where exactly?".into(),
                    parent_id: Some(root.id.clone()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some(root.id.as_str()));

        let listed = h.engine.comments.list_comments(&incident.id).await.unwrap();
        assert_eq!(listed.len(), 2);

        let events = drain(&mut detail);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_name == EventName::CommentAdded));
        assert!(drain(&mut feed).is_empty());
    }

    #[tokio::test]
    async fn reply_to_comment_on_other_incident_is_rejected() {
        let h = harness();
        let first = seed_incident(&h, "alice").await;
        let second = seed_incident(&h, "alice").await;
        let root = h
            .engine
            .comments
            .add_comment(&first.id, &Identity::user("bob"), text("hello"))
            .await
            .unwrap();

        let err = h
            .engine
            .comments
            .add_comment(
                &second.id,
                &Identity::user("bob"),
                NewComment {
                    text: "reply".into(),
                    parent_id: Some(root.id),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn delete_requires_author_or_moderator() {
        let h = harness();
        let incident = seed_incident(&h, "alice").await;
        let comment = h
            .engine
            .comments
            .add_comment(&incident.id, &Identity::user("bob"), text("mine"))
            .await
            .unwrap();

        let err = h
            .engine
            .comments
            .delete_comment(&incident.id, &comment.id, &Identity::user("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        h.engine
            .comments
            .delete_comment(&incident.id, &comment.id, &Identity::moderator("mod"))
            .await
            .unwrap();
        assert!(h.engine.comments.list_comments(&incident.id).await.unwrap().is_empty());

        let err = h
            .engine
            .comments
            .delete_comment(&incident.id, &comment.id, &Identity::user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn comment_on_missing_incident() {
        let h = harness();
        let err = h
            .engine
            .comments
            .add_comment("ghost", &Identity::user("bob"), text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_comment_deletes_announce_once() {
        let h = harness();
        let incident = seed_incident(&h, "alice").await;
        let comment = h
            .engine
            .comments
            .add_comment(&incident.id, &Identity::user("bob"), text("twice"))
            .await
            .unwrap();
        let mut detail = h.broker.connect();
        detail.join(Topic::incident(&incident.id));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let comments = h.engine.comments.clone();
                let (inc, cid) = (incident.id.clone(), comment.id.clone());
                tokio::spawn(async move {
                    comments.delete_comment(&inc, &cid, &Identity::user("bob")).await
                })
            })
            .collect();
        let mut deleted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => deleted += 1,
                Err(e) => assert!(matches!(e, Error::NotFound(_)), "unexpected {e:?}"),
            }
        }

        assert_eq!(deleted, 1);
        let events = drain(&mut detail);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, EventName::CommentDeleted);
    }
}
