//! Vigil Broker - real-time fan-out for incident viewers
//!
//! Keeps every connected viewer's picture of an incident (vote tally, flag
//! status, existence) current without polling. Components that mutate
//! incidents publish deltas; viewers receive them on the topics they joined.
//!
//! # Topics
//!
//! - [`Topic::Feed`] - incident-level summaries for the map/list view
//! - [`Topic::Incident`] - one incident's detail view and comments
//!
//! # Delivery
//!
//! At-least-once while connected, best effort overall: there is no durable
//! queue. A viewer that disconnects misses events until it resubscribes and
//! re-fetches current state. Events published to one topic by one mutation
//! arrive in publish order; nothing is promised across topics.
//!
//! # Example
//!
//! ```
//! use vigil_broker::{Broker, EventName, Topic};
//!
//! let broker = Broker::default();
//! let mut viewer = broker.connect();
//! viewer.join(Topic::incident("abc"));
//!
//! broker.publish(
//!     Topic::incident("abc"),
//!     EventName::VoteUpdated,
//!     serde_json::json!({"upvotes": 1, "downvotes": 0}),
//! );
//!
//! let envelope = viewer.try_recv().unwrap();
//! assert_eq!(envelope.event_name, EventName::VoteUpdated);
//! ```

pub mod broker;
pub mod error;
pub mod event;
pub mod topic;

pub use broker::{Broker, BrokerStats, ConnectionId, Delivery, Subscriber, DEFAULT_SUBSCRIBER_BUFFER};
pub use error::{Error, Result};
pub use event::{now_millis, Envelope, EventName};
pub use topic::Topic;
