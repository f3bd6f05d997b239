//! Lead domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lead contact status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Queued,
    Calling,
    Completed,
    Failed,
    NoAnswer,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Calling => "calling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "calling" => Self::Calling,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "no_answer" => Self::NoAnswer,
            _ => Self::New,
        }
    }
}

/// A prospective customer to be called
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    /// Hard invariant: no call may ever be placed unless this is true
    pub consent_given: bool,
    pub consent_at: Option<DateTime<Utc>>,
    pub status: LeadStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: phone.into(),
            email: None,
            consent_given: false,
            consent_at: None,
            status: LeadStatus::New,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record explicit consent with its timestamp.
    pub fn with_consent(mut self) -> Self {
        self.consent_given = true;
        self.consent_at = Some(Utc::now());
        self
    }

    pub fn has_consent(&self) -> bool {
        self.consent_given
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lead_has_no_consent() {
        let lead = Lead::new("Asha", "+15550100");
        assert!(!lead.has_consent());
        assert!(lead.consent_at.is_none());
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[test]
    fn test_with_consent_stamps_timestamp() {
        let lead = Lead::new("Asha", "+15550100").with_consent();
        assert!(lead.has_consent());
        assert!(lead.consent_at.is_some());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(LeadStatus::from_str("no_answer"), LeadStatus::NoAnswer);
        assert_eq!(LeadStatus::from_str("bogus"), LeadStatus::New);
    }
}
