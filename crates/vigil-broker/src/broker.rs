//! Topic membership and best-effort delivery.
//!
//! Every connection gets a bounded queue. Publishing walks the members of a
//! topic and `try_send`s into each queue, so a publisher never waits on a
//! slow viewer: a full queue drops that one delivery and a closed queue gets
//! its connection torn down.
//!
//! Lock order is always `memberships` then `topics`. `publish` copies the
//! member list out of `topics` before touching `senders`, and never holds
//! two guards at once.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::event::{Envelope, EventName};
use crate::topic::Topic;

/// Default per-connection queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Identity of one live connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Envelopes queued for a subscriber.
    pub delivered: usize,
    /// Subscribers skipped because their queue was full or closed.
    pub dropped: usize,
}

impl Delivery {
    fn merge(&mut self, other: Delivery) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

/// Snapshot of broker membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub connections: usize,
    /// Member count per topic, keyed by wire name.
    pub topics: BTreeMap<String, usize>,
}

struct Inner {
    next_id: AtomicU64,
    buffer: usize,
    senders: DashMap<ConnectionId, mpsc::Sender<Arc<Envelope>>>,
    memberships: DashMap<ConnectionId, HashSet<Topic>>,
    topics: DashMap<Topic, HashSet<ConnectionId>>,
}

/// Process-wide fan-out broker.
///
/// Cheap to clone; every clone shares the same membership tables. Hand one to
/// each component that publishes.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("buffer", &self.inner.buffer)
            .field("connections", &self.inner.senders.len())
            .field("topics", &self.inner.topics.len())
            .finish()
    }
}

impl Broker {
    /// Create a broker whose subscribers buffer up to `buffer` envelopes.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                senders: DashMap::new(),
                memberships: DashMap::new(),
                topics: DashMap::new(),
            }),
        }
    }

    /// Register a new connection. It starts with no topics.
    pub fn connect(&self) -> Subscriber {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        self.inner.senders.insert(id, tx);
        self.inner.memberships.insert(id, HashSet::new());
        debug!(%id, "subscriber connected");
        Subscriber {
            id,
            rx,
            broker: self.clone(),
        }
    }

    /// Add `conn` to `topic`. Returns `false` if it was already a member or
    /// the connection is gone.
    pub fn join(&self, conn: ConnectionId, topic: Topic) -> bool {
        let Some(mut topics_of_conn) = self.inner.memberships.get_mut(&conn) else {
            return false;
        };
        if !topics_of_conn.insert(topic.clone()) {
            return false;
        }
        self.inner.topics.entry(topic.clone()).or_default().insert(conn);
        debug!(%conn, %topic, "joined topic");
        true
    }

    /// Remove `conn` from `topic`. Returns `false` if it was not a member.
    pub fn leave(&self, conn: ConnectionId, topic: &Topic) -> bool {
        let Some(mut topics_of_conn) = self.inner.memberships.get_mut(&conn) else {
            return false;
        };
        if !topics_of_conn.remove(topic) {
            return false;
        }
        self.remove_member(topic, conn);
        debug!(%conn, %topic, "left topic");
        true
    }

    /// Drop every membership held by `conn`.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.inner.senders.remove(&conn);
        if let Some((_, topics)) = self.inner.memberships.remove(&conn) {
            for topic in &topics {
                self.remove_member(topic, conn);
            }
            debug!(%conn, topics = topics.len(), "subscriber disconnected");
        }
    }

    /// Whether `conn` is currently a member of `topic`.
    pub fn is_member(&self, conn: ConnectionId, topic: &Topic) -> bool {
        self.inner
            .memberships
            .get(&conn)
            .map(|t| t.contains(topic))
            .unwrap_or(false)
    }

    /// Topics `conn` is a member of.
    pub fn topics_of(&self, conn: ConnectionId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .inner
            .memberships
            .get(&conn)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Number of members of `topic`.
    pub fn member_count(&self, topic: &Topic) -> usize {
        self.inner.topics.get(topic).map(|m| m.len()).unwrap_or(0)
    }

    /// Queue an event for every member of `topic`.
    pub fn publish(
        &self,
        topic: Topic,
        event_name: EventName,
        payload: serde_json::Value,
    ) -> Delivery {
        let members: Vec<ConnectionId> = match self.inner.topics.get(&topic) {
            Some(members) => members.iter().copied().collect(),
            None => return Delivery::default(),
        };

        let envelope = Arc::new(Envelope::new(topic, event_name, payload));
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        for conn in members {
            let sender = match self.inner.senders.get(&conn) {
                Some(sender) => sender.clone(),
                None => {
                    closed.push(conn);
                    continue;
                }
            };
            match sender.try_send(Arc::clone(&envelope)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        %conn,
                        topic = %envelope.topic,
                        event = %envelope.event_name,
                        "subscriber queue full, dropping event"
                    );
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    delivery.dropped += 1;
                    closed.push(conn);
                }
            }
        }

        for conn in closed {
            self.disconnect(conn);
        }

        debug!(
            topic = %envelope.topic,
            event = %envelope.event_name,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "published"
        );
        delivery
    }

    /// Publish the same event to several topics, in order.
    pub fn publish_to(
        &self,
        topics: impl IntoIterator<Item = Topic>,
        event_name: EventName,
        payload: serde_json::Value,
    ) -> Delivery {
        let mut total = Delivery::default();
        for topic in topics {
            total.merge(self.publish(topic, event_name, payload.clone()));
        }
        total
    }

    /// Connection and per-topic member counts.
    pub fn stats(&self) -> BrokerStats {
        let topics = self
            .inner
            .topics
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().to_string(), entry.value().len()))
            .collect();
        BrokerStats {
            connections: self.inner.senders.len(),
            topics,
        }
    }

    fn remove_member(&self, topic: &Topic, conn: ConnectionId) {
        let now_empty = match self.inner.topics.get_mut(topic) {
            Some(mut members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inner.topics.remove_if(topic, |_, members| members.is_empty());
        }
    }
}

/// Receiving end of one connection.
///
/// Dropping it tears down all of its topic memberships.
pub struct Subscriber {
    id: ConnectionId,
    rx: mpsc::Receiver<Arc<Envelope>>,
    broker: Broker,
}

impl Subscriber {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Join a topic on behalf of this connection.
    pub fn join(&self, topic: Topic) -> bool {
        self.broker.join(self.id, topic)
    }

    /// Leave a topic on behalf of this connection.
    pub fn leave(&self, topic: &Topic) -> bool {
        self.broker.leave(self.id, topic)
    }

    /// Wait for the next envelope. `None` once the connection is torn down.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.broker.disconnect(self.id);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}
