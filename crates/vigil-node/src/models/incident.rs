//! Incident model - the central moderated record.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted title, in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 5000;
/// Longest accepted address, in characters.
pub const MAX_ADDRESS_LEN: usize = 300;

/// Kind of incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crime,
    Accident,
    Lost,
    Utility,
    Other,
}

/// How serious the reporter judges the incident to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// Where the incident happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    fn validate(&self) -> Result<()> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(Error::Validation("location address is required".into()));
        }
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(Error::Validation(format!(
                "location address exceeds {MAX_ADDRESS_LEN} characters"
            )));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Validation(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Validation(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// A user-submitted report of a local event.
///
/// `verified_false` and `is_flagged` are never both set: a verdict resolves
/// the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Unique identifier (hex)
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub category: Category,
    pub severity: Severity,
    /// Milliseconds since the UNIX epoch
    pub created_at: u64,
    /// Identity id of the reporter
    pub author_id: String,
    /// Opaque reference handed out by the image upload service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_flagged: bool,
    #[serde(default)]
    pub verified_false: bool,
}

impl Incident {
    /// Key prefix in the RocksDB record store.
    pub const KEY_PREFIX: &'static str = "incident";
}

/// Fields a client supplies when reporting an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    pub category: Category,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewIncident {
    /// Validate and build the persisted record.
    pub fn into_incident(self, id: String, author_id: &str, created_at: u64) -> Result<Incident> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("title is required".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::Validation(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        let description = self.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        self.location.validate()?;

        Ok(Incident {
            id,
            title,
            description,
            location: Location {
                address: self.location.address.trim().to_string(),
                ..self.location
            },
            category: self.category,
            severity: self.severity.unwrap_or_default(),
            created_at,
            author_id: author_id.to_string(),
            image_url: self.image_url.filter(|u| !u.trim().is_empty()),
            is_flagged: false,
            verified_false: false,
        })
    }
}
