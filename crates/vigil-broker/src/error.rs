//! Error types for vigil-broker.

use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling topics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Topic string did not match `feed` or `incident:{id}`.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// `incident:` prefix with nothing after it.
    #[error("incident topic requires an incident id")]
    MissingIncidentId,
}
