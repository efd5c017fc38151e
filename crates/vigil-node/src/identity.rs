//! Authenticated caller identity.
//!
//! Credential checking happens outside Vigil. What arrives here is an
//! already-authenticated `{id, role}` pair; ownership and role are still
//! re-checked on every mutating operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Caller role as asserted by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" | "admin" => Ok(Role::Moderator),
            other => Err(Error::Validation(format!("unknown role {other:?}"))),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Validation("identity id must not be empty".into()));
        }
        Ok(Self { id, role })
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
        }
    }

    pub fn moderator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Moderator,
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }

    /// Fail with `Forbidden` unless the caller is a moderator.
    pub fn require_moderator(&self, action: &str) -> Result<()> {
        if self.is_moderator() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{action} requires the moderator role")))
        }
    }

    /// Moderators may manage anything; everyone else only their own records.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.is_moderator() || self.id == owner_id
    }
}
