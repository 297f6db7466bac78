use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadflow_core::domain::lead::{LeadId, LeadRecord, SessionId};
use leadflow_core::domain::transcript::Transcript;

pub mod lead;
pub mod memory;
pub mod transcript;

pub use lead::SqlLeadRepository;
pub use memory::{InMemoryLeadRepository, InMemoryTranscriptRepository};
pub use transcript::SqlTranscriptRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find(&self, session_id: &SessionId) -> Result<Option<LeadRecord>, RepositoryError>;

    async fn save(&self, record: LeadRecord) -> Result<(), RepositoryError>;

    /// Candidates for the creation sweep: records not yet linked to a CRM
    /// lead whose creation attempts are below the cap.
    async fn list_unlinked(&self, max_attempts: u32)
        -> Result<Vec<LeadRecord>, RepositoryError>;

    /// Candidates for the update sweep: linked records touched after the
    /// cutoff whose update attempts are below the cap.
    async fn list_recently_linked(
        &self,
        updated_after: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<LeadRecord>, RepositoryError>;

    /// All sessions linked to one CRM lead, most recently updated first.
    async fn list_by_lead_id(&self, lead_id: &LeadId)
        -> Result<Vec<LeadRecord>, RepositoryError>;

    /// Acquires the sweep lease for one session. Returns false when another
    /// worker holds an unexpired lease.
    async fn try_claim(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn release(&self, session_id: &SessionId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TranscriptRepository: Send + Sync {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Transcript>, RepositoryError>;

    async fn save(&self, transcript: Transcript) -> Result<(), RepositoryError>;
}
