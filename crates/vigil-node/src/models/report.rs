//! False-report model.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reason recorded when the reporter gives none.
pub const DEFAULT_REASON: &str = "Possibly false or spam";
/// Longest accepted reason, in characters.
pub const MAX_REASON_LEN: usize = 500;

/// A user's claim that an incident is false. Unique per (incident, reporter).
///
/// Verdicts never delete reports; they stay as an audit trail until the
/// incident itself is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalseReport {
    pub id: String,
    pub incident_id: String,
    pub reporter_id: String,
    pub reason: String,
    /// Milliseconds since the UNIX epoch
    pub created_at: u64,
}

impl FalseReport {
    /// Key prefix in the RocksDB record store.
    pub const KEY_PREFIX: &'static str = "report";

    pub fn receipt(&self) -> ReportReceipt {
        ReportReceipt {
            report_id: self.id.clone(),
            reason: self.reason.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Trim the reason and fall back to [`DEFAULT_REASON`] when blank.
pub fn normalize_reason(reason: Option<String>) -> Result<String> {
    let reason = reason.as_deref().map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Ok(DEFAULT_REASON.to_string());
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(Error::Validation(format!(
            "reason exceeds {MAX_REASON_LEN} characters"
        )));
    }
    Ok(reason.to_string())
}

/// Response to a successful report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReceipt {
    pub report_id: String,
    pub reason: String,
    pub timestamp: u64,
}

/// Whether a given reporter has already reported an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    pub has_reported: bool,
    pub report: Option<FalseReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_reason_gets_default() {
        assert_eq!(normalize_reason(None).unwrap(), DEFAULT_REASON);
        assert_eq!(normalize_reason(Some("   ".into())).unwrap(), DEFAULT_REASON);
    }

    #[test]
    fn reason_is_trimmed() {
        assert_eq!(normalize_reason(Some(" spam \n".into())).unwrap(), "spam");
    }

    #[test]
    fn overlong_reason_rejected() {
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(matches!(
            normalize_reason(Some(long)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn receipt_copies_fields() {
        let report = FalseReport {
            id: "r1".into(),
            incident_id: "i1".into(),
            reporter_id: "dave".into(),
            reason: "spam".into(),
            created_at: 99,
        };
        let receipt = report.receipt();
        assert_eq!(receipt.report_id, "r1");
        assert_eq!(receipt.timestamp, 99);
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["reportId"], "r1");
    }
}
