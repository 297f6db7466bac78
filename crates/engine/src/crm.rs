use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use leadflow_core::domain::lead::{LeadId, SessionId};
use leadflow_core::domain::snapshot::CrmFieldMap;
use leadflow_db::repositories::LeadRepository;

/// How many prior session summaries are folded into a merged description.
const MERGE_SUMMARY_LIMIT: usize = 4;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("a lead with this email already exists")]
    DuplicateEmail,
    #[error("a lead with this phone number already exists")]
    DuplicatePhone,
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("lead not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn create_lead(&self, fields: &CrmFieldMap) -> Result<LeadId, CrmError>;
    async fn update_lead(&self, lead_id: &LeadId, fields: &CrmFieldMap) -> Result<(), CrmError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<LeadId>, CrmError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LeadId>, CrmError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteResult {
    Created { lead_id: LeadId },
    /// A unique-field conflict was resolved by updating the existing lead.
    Merged { lead_id: LeadId, message: String },
    Updated { lead_id: LeadId },
    /// Terminal for this pass; the record stays eligible for a later sweep.
    Failed { message: String },
}

/// Wraps the raw CRM client with retries and duplicate-merge resolution.
/// Never returns an error: every failure mode folds into `WriteResult::Failed`
/// so one bad session cannot abort a sweep.
pub struct CrmWriter {
    crm: Arc<dyn CrmClient>,
    leads: Arc<dyn LeadRepository>,
    attempts: u32,
    backoff: Duration,
}

enum UniqueField {
    Email,
    Phone,
}

impl CrmWriter {
    pub fn new(
        crm: Arc<dyn CrmClient>,
        leads: Arc<dyn LeadRepository>,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self { crm, leads, attempts: attempts.max(1), backoff }
    }

    /// Creates a lead, retrying transient rejections with a fixed backoff.
    /// A duplicate email or phone resolves by merging into the existing lead
    /// instead of creating a second one.
    pub async fn create_with_merge(&self, fields: &CrmFieldMap, summary: &str) -> WriteResult {
        let mut payload = fields.clone();
        payload.insert("Description".to_string(), summary.to_string());

        for attempt in 1..=self.attempts {
            match self.crm.create_lead(&payload).await {
                Ok(lead_id) => {
                    info!(event_name = "crm.lead_created", lead_id = %lead_id);
                    return WriteResult::Created { lead_id };
                }
                Err(CrmError::DuplicateEmail) => {
                    return self.merge_into_existing(UniqueField::Email, fields, summary, None).await;
                }
                Err(CrmError::DuplicatePhone) => {
                    return self.merge_into_existing(UniqueField::Phone, fields, summary, None).await;
                }
                Err(error @ (CrmError::MalformedRequest(_) | CrmError::NotFound(_))) => {
                    if attempt < self.attempts {
                        warn!(
                            event_name = "crm.create_retry",
                            attempt,
                            max_attempts = self.attempts,
                            error = %error,
                        );
                        tokio::time::sleep(self.backoff).await;
                    } else {
                        return WriteResult::Failed {
                            message: format!("error in creating lead: {error}"),
                        };
                    }
                }
                Err(error) => {
                    return WriteResult::Failed {
                        message: format!("unexpected error in creating lead: {error}"),
                    };
                }
            }
        }

        WriteResult::Failed { message: "max retries reached, could not create lead".to_string() }
    }

    /// Pushes the latest snapshot of a linked session to its lead, merging
    /// this session's summary with recent summaries of sibling sessions.
    pub async fn update_with_merge(
        &self,
        lead_id: &LeadId,
        fields: &CrmFieldMap,
        summary: &str,
        current_session: &SessionId,
    ) -> WriteResult {
        let merged = match self.merged_summary(lead_id, summary, Some(current_session)).await {
            Ok(merged) => merged,
            Err(message) => return WriteResult::Failed { message },
        };

        let mut payload = fields.clone();
        payload.insert("Description".to_string(), merged);

        match self.crm.update_lead(lead_id, &payload).await {
            Ok(()) => {
                info!(event_name = "crm.lead_updated", lead_id = %lead_id);
                WriteResult::Updated { lead_id: lead_id.clone() }
            }
            Err(error) => {
                WriteResult::Failed { message: format!("error in updating lead: {error}") }
            }
        }
    }

    async fn merge_into_existing(
        &self,
        unique_field: UniqueField,
        fields: &CrmFieldMap,
        summary: &str,
        current_session: Option<&SessionId>,
    ) -> WriteResult {
        let (key, value, lookup) = match unique_field {
            UniqueField::Email => {
                let value = fields.get("Email").cloned().unwrap_or_default();
                let lookup = self.crm.find_by_email(&value).await;
                ("email", value, lookup)
            }
            UniqueField::Phone => {
                let value = fields.get("Phone").cloned().unwrap_or_default();
                let lookup = self.crm.find_by_phone(&value).await;
                ("phone", value, lookup)
            }
        };

        let lead_id = match lookup {
            Ok(Some(lead_id)) => lead_id,
            Ok(None) => {
                return WriteResult::Failed {
                    message: format!("duplicate {key} reported but no lead found for {value}"),
                };
            }
            Err(error) => {
                return WriteResult::Failed {
                    message: format!("error looking up existing lead by {key}: {error}"),
                };
            }
        };

        let merged = match self.merged_summary(&lead_id, summary, current_session).await {
            Ok(merged) => merged,
            Err(message) => return WriteResult::Failed { message },
        };

        let mut payload = fields.clone();
        payload.insert("Description".to_string(), merged);

        match self.crm.update_lead(&lead_id, &payload).await {
            Ok(()) => {
                let message = format!(
                    "lead {lead_id} already exists for {key} {value}, updated the existing lead"
                );
                info!(event_name = "crm.duplicate_merged", lead_id = %lead_id, field = key);
                WriteResult::Merged { lead_id, message }
            }
            Err(error) => WriteResult::Failed {
                message: format!("duplicate {key} found but updating lead {lead_id} failed: {error}"),
            },
        }
    }

    /// Current summary first, then the most recent prior summaries sharing
    /// the lead id, capped at [`MERGE_SUMMARY_LIMIT`].
    async fn merged_summary(
        &self,
        lead_id: &LeadId,
        summary: &str,
        exclude_session: Option<&SessionId>,
    ) -> Result<String, String> {
        let siblings = self
            .leads
            .list_by_lead_id(lead_id)
            .await
            .map_err(|error| format!("error listing sessions for lead {lead_id}: {error}"))?;

        let mut parts = vec![summary.to_string()];
        parts.extend(
            siblings
                .iter()
                .filter(|record| Some(&record.session_id) != exclude_session)
                .filter_map(|record| record.summary.clone())
                .take(MERGE_SUMMARY_LIMIT),
        );

        Ok(parts.join("\n\n"))
    }
}
