//! Comment model - threaded discussion on an incident.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted comment body, in characters.
pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub incident_id: String,
    pub author_id: String,
    pub text: String,
    /// Milliseconds since the UNIX epoch
    pub created_at: u64,
    /// Comment this one replies to, on the same incident
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Comment {
    /// Key prefix in the RocksDB record store.
    pub const KEY_PREFIX: &'static str = "comment";
}

/// Fields a client supplies when commenting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl NewComment {
    pub fn into_comment(
        self,
        id: String,
        incident_id: &str,
        author_id: &str,
        created_at: u64,
    ) -> Result<Comment> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(Error::Validation("comment text is required".into()));
        }
        if text.chars().count() > MAX_COMMENT_LEN {
            return Err(Error::Validation(format!(
                "comment exceeds {MAX_COMMENT_LEN} characters"
            )));
        }
        Ok(Comment {
            id,
            incident_id: incident_id.to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            created_at,
            parent_id: self.parent_id.filter(|p| !p.trim().is_empty()),
        })
    }
}
