use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::FieldSnapshot;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External CRM identifier. Only ever present after a successful create or a
/// duplicate merge; a failed attempt leaves the record unlinked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// No reconciliation attempt has completed for this session yet.
    Pending,
    Created,
    NotQualified,
    Failed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::NotQualified => "not_qualified",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "not_qualified" => Self::NotQualified,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Per-session reconciliation state. One row per session; never deleted by
/// this core. Multiple records may share a `lead_id` when contact-field
/// collisions merge sessions into one CRM lead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadRecord {
    pub session_id: SessionId,
    pub lead_id: Option<LeadId>,
    pub snapshot: FieldSnapshot,
    pub summary: Option<String>,
    /// Raw user inputs at the time of the last reconciliation, kept for the
    /// list-delta short circuit in the update sweep.
    pub captured_inputs: Vec<String>,
    pub creation_attempts: u32,
    pub update_attempts: u32,
    pub status: LeadStatus,
    pub status_message: Option<String>,
    /// Sweep lease: a session claimed by a running sweep is skipped by
    /// overlapping invocations until this expires.
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// The implicit zero record for a session with no stored state.
    pub fn empty(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            lead_id: None,
            snapshot: FieldSnapshot::default(),
            summary: None,
            captured_inputs: Vec::new(),
            creation_attempts: 0,
            update_attempts: 0,
            status: LeadStatus::Pending,
            status_message: None,
            lease_until: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.lead_id.is_some()
    }
}
