use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use leadflow_agent::conversation::summarize;
use leadflow_agent::extraction::extract_snapshot;
use leadflow_agent::llm::LlmClient;
use leadflow_core::config::SweepConfig;
use leadflow_core::delta::{changed_entries, list_additions};
use leadflow_core::domain::lead::{LeadId, LeadRecord, LeadStatus, SessionId};
use leadflow_core::domain::snapshot::FieldSnapshot;
use leadflow_core::errors::ApplicationError;
use leadflow_db::repositories::{LeadRepository, TranscriptRepository};

use crate::crm::{CrmClient, CrmWriter, WriteResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreationOutcome {
    Created { lead_id: LeadId },
    /// The CRM already held a lead with this email or phone; the session was
    /// linked to it instead of creating a second lead.
    MergedDuplicate { lead_id: LeadId },
    SkippedNoTranscript,
    SkippedNoContactInfo,
    SkippedAttemptCap,
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { lead_id: LeadId },
    SkippedNoTranscript,
    /// The transcript was not touched within the recency window even though
    /// the lead record was.
    SkippedStaleTranscript,
    SkippedNoContactInfo,
    SkippedAttemptCap,
    /// No user input the engine has not already seen.
    NoNewInput,
    /// New input, but re-extraction produced the same CRM field values.
    NoFieldDelta,
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OnDemandOutcome {
    /// The conversation has not produced enough user turns to qualify.
    NotEnoughTurns,
    /// A lead record already exists for this session; the sweeps own it now.
    AlreadyRecorded,
    Created { lead_id: LeadId, message: String },
    MergedDuplicate { lead_id: LeadId, message: String },
    /// Enough turns, but mandatory contact fields are missing. A record is
    /// still written so the creation sweep can retry after more conversation.
    NotQualified { message: String },
    Failed { message: String },
}

pub struct ReconcileEngine {
    pub(crate) leads: Arc<dyn LeadRepository>,
    pub(crate) transcripts: Arc<dyn TranscriptRepository>,
    llm: Arc<dyn LlmClient>,
    writer: CrmWriter,
    pub(crate) config: SweepConfig,
}

impl ReconcileEngine {
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        transcripts: Arc<dyn TranscriptRepository>,
        llm: Arc<dyn LlmClient>,
        crm: Arc<dyn CrmClient>,
        config: SweepConfig,
    ) -> Self {
        let writer = CrmWriter::new(
            crm,
            Arc::clone(&leads),
            config.crm_write_attempts,
            config.crm_retry_backoff(),
        );
        Self { leads, transcripts, llm, writer, config }
    }

    /// One creation pass for one unlinked session. The attempt counter
    /// increments exactly once per pass that reaches the CRM, regardless of
    /// how many retries the write itself performed.
    pub async fn reconcile_creation(
        &self,
        record: &LeadRecord,
    ) -> Result<CreationOutcome, ApplicationError> {
        if record.creation_attempts >= self.config.max_creation_attempts {
            return Ok(CreationOutcome::SkippedAttemptCap);
        }

        let transcript = match self
            .transcripts
            .find(&record.session_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
        {
            Some(transcript) => transcript,
            None => return Ok(CreationOutcome::SkippedNoTranscript),
        };

        let user_inputs = transcript.user_inputs();

        let mut snapshot = match extract_snapshot(self.llm.as_ref(), &user_inputs).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return Ok(CreationOutcome::Failed {
                    message: format!("unable to extract user details: {error}"),
                });
            }
        };

        if !snapshot.has_contact_info() {
            info!(
                event_name = "reconcile.not_qualified",
                session_id = %record.session_id,
            );
            // Burn an attempt so a session that never qualifies ages out of
            // the sweep instead of being re-extracted forever.
            self.persist_pass(
                record,
                None,
                snapshot,
                None,
                user_inputs,
                record.creation_attempts + 1,
                record.update_attempts,
                LeadStatus::NotQualified,
                "mandatory user details are not present to create lead".to_string(),
            )
            .await?;
            return Ok(CreationOutcome::SkippedNoContactInfo);
        }
        snapshot.promote_single_name();

        let summary = match summarize(self.llm.as_ref(), &transcript, Utc::now()).await {
            Ok(summary) => summary,
            Err(error) => {
                return Ok(CreationOutcome::Failed {
                    message: format!("unable to summarize conversation: {error}"),
                });
            }
        };

        let fields = snapshot.to_crm_fields();
        let write = self.writer.create_with_merge(&fields, &summary).await;

        let (outcome, lead_id, status, message) = match write {
            WriteResult::Created { lead_id } => (
                CreationOutcome::Created { lead_id: lead_id.clone() },
                Some(lead_id),
                LeadStatus::Created,
                "successfully created".to_string(),
            ),
            WriteResult::Merged { lead_id, message } => (
                CreationOutcome::MergedDuplicate { lead_id: lead_id.clone() },
                Some(lead_id),
                LeadStatus::Created,
                message,
            ),
            WriteResult::Updated { lead_id } => (
                CreationOutcome::MergedDuplicate { lead_id: lead_id.clone() },
                Some(lead_id),
                LeadStatus::Created,
                "updated existing lead".to_string(),
            ),
            WriteResult::Failed { message } => {
                (CreationOutcome::Failed { message: message.clone() }, None, LeadStatus::Failed, message)
            }
        };

        self.persist_pass(
            record,
            lead_id,
            snapshot,
            Some(summary),
            user_inputs,
            record.creation_attempts + 1,
            record.update_attempts,
            status,
            message,
        )
        .await?;

        Ok(outcome)
    }

    /// One update pass for one linked session, layered short circuits first:
    /// list delta over raw inputs, then field delta over extracted values.
    pub async fn reconcile_update(
        &self,
        record: &LeadRecord,
        transcript_cutoff: DateTime<Utc>,
    ) -> Result<UpdateOutcome, ApplicationError> {
        if record.update_attempts >= self.config.max_update_attempts {
            return Ok(UpdateOutcome::SkippedAttemptCap);
        }

        let lead_id = match &record.lead_id {
            Some(lead_id) => lead_id.clone(),
            None => {
                return Err(ApplicationError::Persistence(format!(
                    "update candidate {} has no lead id",
                    record.session_id
                )));
            }
        };

        let transcript = match self
            .transcripts
            .find(&record.session_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
        {
            Some(transcript) => transcript,
            None => return Ok(UpdateOutcome::SkippedNoTranscript),
        };

        if transcript.updated_at < transcript_cutoff {
            return Ok(UpdateOutcome::SkippedStaleTranscript);
        }

        let user_inputs = transcript.user_inputs();
        let additions = list_additions(&record.captured_inputs, &user_inputs);
        if additions.is_empty() {
            return Ok(UpdateOutcome::NoNewInput);
        }

        let mut snapshot = match extract_snapshot(self.llm.as_ref(), &user_inputs).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return Ok(UpdateOutcome::Failed {
                    message: format!("unable to extract user details: {error}"),
                });
            }
        };

        if !snapshot.has_contact_info() {
            return Ok(UpdateOutcome::SkippedNoContactInfo);
        }
        snapshot.promote_single_name();

        let new_fields = snapshot.to_crm_fields();
        let field_delta = changed_entries(&record.snapshot.to_crm_fields(), &new_fields);
        if field_delta.is_empty() {
            return Ok(UpdateOutcome::NoFieldDelta);
        }
        info!(
            event_name = "reconcile.field_delta",
            session_id = %record.session_id,
            changed = field_delta.len(),
        );

        let summary = match summarize(self.llm.as_ref(), &transcript, Utc::now()).await {
            Ok(summary) => summary,
            Err(error) => {
                return Ok(UpdateOutcome::Failed {
                    message: format!("unable to summarize conversation: {error}"),
                });
            }
        };

        // The CRM receives the full field map; the delta only gates the write.
        let write = self
            .writer
            .update_with_merge(&lead_id, &new_fields, &summary, &record.session_id)
            .await;

        let (lead_id, message) = match write {
            WriteResult::Updated { lead_id } | WriteResult::Created { lead_id } => {
                (lead_id, "successfully updated".to_string())
            }
            WriteResult::Merged { lead_id, message } => (lead_id, message),
            WriteResult::Failed { message } => {
                // Only the attempt counter advances on failure; the snapshot
                // and captured inputs stay at their last synced values so the
                // next sweep sees the same delta and retries the write.
                self.persist_pass(
                    record,
                    record.lead_id.clone(),
                    record.snapshot.clone(),
                    record.summary.clone(),
                    record.captured_inputs.clone(),
                    record.creation_attempts,
                    record.update_attempts + 1,
                    record.status,
                    message.clone(),
                )
                .await?;
                return Ok(UpdateOutcome::Failed { message });
            }
        };

        self.persist_pass(
            record,
            record.lead_id.clone(),
            snapshot,
            Some(summary),
            user_inputs,
            record.creation_attempts,
            record.update_attempts + 1,
            LeadStatus::Created,
            message,
        )
        .await?;

        Ok(UpdateOutcome::Updated { lead_id })
    }

    /// Immediate creation requested by the chat front end at conversation
    /// end. Unlike the sweep, an unqualified-but-long conversation writes a
    /// record here so the creation sweep can pick it up later.
    pub async fn create_on_demand(
        &self,
        session_id: &SessionId,
        extra_query: Option<&str>,
    ) -> Result<OnDemandOutcome, ApplicationError> {
        let transcript = self
            .transcripts
            .find(session_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let mut user_inputs =
            transcript.as_ref().map(|t| t.user_inputs()).unwrap_or_default();
        if let Some(query) = extra_query {
            if !query.trim().is_empty() {
                user_inputs.push(query.trim().to_string());
            }
        }

        if user_inputs.len() <= self.config.min_user_turns {
            return Ok(OnDemandOutcome::NotEnoughTurns);
        }

        let existing = self
            .leads
            .find(session_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        if existing.is_some() {
            return Ok(OnDemandOutcome::AlreadyRecorded);
        }

        let mut snapshot = match extract_snapshot(self.llm.as_ref(), &user_inputs).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return Ok(OnDemandOutcome::Failed {
                    message: format!("unable to extract user details: {error}"),
                });
            }
        };

        let seed = LeadRecord::empty(session_id.clone());

        if !snapshot.has_contact_info() {
            let message = "mandatory user details are not present to create lead".to_string();
            self.persist_pass(
                &seed,
                None,
                snapshot,
                None,
                user_inputs,
                1,
                0,
                LeadStatus::NotQualified,
                message.clone(),
            )
            .await?;
            return Ok(OnDemandOutcome::NotQualified { message });
        }
        snapshot.promote_single_name();

        let summary = match transcript {
            Some(ref transcript) => {
                match summarize(self.llm.as_ref(), transcript, Utc::now()).await {
                    Ok(summary) => summary,
                    Err(error) => {
                        return Ok(OnDemandOutcome::Failed {
                            message: format!("unable to summarize conversation: {error}"),
                        });
                    }
                }
            }
            None => String::new(),
        };

        let fields = snapshot.to_crm_fields();
        let write = self.writer.create_with_merge(&fields, &summary).await;

        let (outcome, lead_id, status, message) = match write {
            WriteResult::Created { lead_id } => {
                let message = "successfully created".to_string();
                (
                    OnDemandOutcome::Created { lead_id: lead_id.clone(), message: message.clone() },
                    Some(lead_id),
                    LeadStatus::Created,
                    message,
                )
            }
            WriteResult::Merged { lead_id, message } => (
                OnDemandOutcome::MergedDuplicate {
                    lead_id: lead_id.clone(),
                    message: message.clone(),
                },
                Some(lead_id),
                LeadStatus::Created,
                message,
            ),
            WriteResult::Updated { lead_id } => {
                let message = "updated existing lead".to_string();
                (
                    OnDemandOutcome::MergedDuplicate {
                        lead_id: lead_id.clone(),
                        message: message.clone(),
                    },
                    Some(lead_id),
                    LeadStatus::Created,
                    message,
                )
            }
            WriteResult::Failed { message } => (
                OnDemandOutcome::Failed { message: message.clone() },
                None,
                LeadStatus::Failed,
                message,
            ),
        };

        self.persist_pass(&seed, lead_id, snapshot, Some(summary), user_inputs, 1, 0, status, message)
            .await?;

        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_pass(
        &self,
        record: &LeadRecord,
        lead_id: Option<LeadId>,
        snapshot: FieldSnapshot,
        summary: Option<String>,
        captured_inputs: Vec<String>,
        creation_attempts: u32,
        update_attempts: u32,
        status: LeadStatus,
        message: String,
    ) -> Result<(), ApplicationError> {
        let updated = LeadRecord {
            session_id: record.session_id.clone(),
            lead_id,
            snapshot,
            summary,
            captured_inputs,
            creation_attempts,
            update_attempts,
            status,
            status_message: Some(message),
            lease_until: record.lease_until,
            created_at: record.created_at,
            last_updated_at: Utc::now(),
        };

        self.leads
            .save(updated)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))
    }
}
