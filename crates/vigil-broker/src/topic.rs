//! Typed subscription topics.
//!
//! A viewer is either watching the global incident feed or the detail view of
//! one incident. On the wire a topic is a plain string: `feed` or
//! `incident:{id}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const FEED: &str = "feed";
const INCIDENT_PREFIX: &str = "incident:";

/// A named channel of interested viewers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    /// Incident-level summaries for every viewer of the map/list.
    Feed,
    /// Detail view (tally, flags, comments) of a single incident.
    Incident(String),
}

impl Topic {
    /// Detail topic for an incident.
    pub fn incident(id: impl Into<String>) -> Self {
        Topic::Incident(id.into())
    }

    /// The incident id for a detail topic, `None` for the feed.
    pub fn incident_id(&self) -> Option<&str> {
        match self {
            Topic::Feed => None,
            Topic::Incident(id) => Some(id),
        }
    }

    /// Both topics a change to `incident_id` is visible on.
    pub fn feed_and_incident(incident_id: &str) -> [Topic; 2] {
        [Topic::Feed, Topic::incident(incident_id)]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Feed => f.write_str(FEED),
            Topic::Incident(id) => write!(f, "{INCIDENT_PREFIX}{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == FEED {
            return Ok(Topic::Feed);
        }
        match s.strip_prefix(INCIDENT_PREFIX) {
            Some("") => Err(Error::MissingIncidentId),
            Some(id) => Ok(Topic::Incident(id.to_string())),
            None => Err(Error::InvalidTopic(s.to_string())),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}
