use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadflow_core::domain::lead::{LeadId, LeadRecord, SessionId};
use leadflow_core::domain::transcript::Transcript;

use super::{LeadRepository, RepositoryError, TranscriptRepository};

#[derive(Default)]
pub struct InMemoryLeadRepository {
    records: RwLock<HashMap<String, LeadRecord>>,
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn find(&self, session_id: &SessionId) -> Result<Option<LeadRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&session_id.0).cloned())
    }

    async fn save(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.session_id.0.clone(), record);
        Ok(())
    }

    async fn list_unlinked(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<LeadRecord> = records
            .values()
            .filter(|record| record.lead_id.is_none() && record.creation_attempts < max_attempts)
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.last_updated_at);
        Ok(matching)
    }

    async fn list_recently_linked(
        &self,
        updated_after: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<LeadRecord> = records
            .values()
            .filter(|record| {
                record.lead_id.is_some()
                    && record.last_updated_at >= updated_after
                    && record.update_attempts < max_attempts
            })
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.last_updated_at);
        Ok(matching)
    }

    async fn list_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<LeadRecord> = records
            .values()
            .filter(|record| record.lead_id.as_ref() == Some(lead_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(matching)
    }

    async fn try_claim(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&session_id.0) {
            Some(record) => match record.lease_until {
                Some(held) if held >= now => Ok(false),
                _ => {
                    record.lease_until = Some(lease_until);
                    Ok(true)
                }
            },
            None => Ok(false),
        }
    }

    async fn release(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&session_id.0) {
            record.lease_until = None;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTranscriptRepository {
    transcripts: RwLock<HashMap<String, Transcript>>,
}

#[async_trait::async_trait]
impl TranscriptRepository for InMemoryTranscriptRepository {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Transcript>, RepositoryError> {
        let transcripts = self.transcripts.read().await;
        Ok(transcripts.get(&session_id.0).cloned())
    }

    async fn save(&self, transcript: Transcript) -> Result<(), RepositoryError> {
        let mut transcripts = self.transcripts.write().await;
        transcripts.insert(transcript.session_id.0.clone(), transcript);
        Ok(())
    }
}
