use chrono::{DateTime, Utc};
use sqlx::Row;

use leadflow_core::domain::lead::{LeadId, LeadRecord, LeadStatus, SessionId};
use leadflow_core::domain::snapshot::FieldSnapshot;

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const LEAD_COLUMNS: &str = "session_id, lead_id, field_snapshot, summary, captured_inputs,
     creation_attempts, update_attempts, status, status_message, lease_until,
     created_at, last_updated_at";

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<LeadRecord, RepositoryError> {
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lead_id: Option<String> =
        row.try_get("lead_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let snapshot_json: String =
        row.try_get("field_snapshot").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let summary: Option<String> =
        row.try_get("summary").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let captured_inputs_json: String =
        row.try_get("captured_inputs").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let creation_attempts: i64 =
        row.try_get("creation_attempts").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let update_attempts: i64 =
        row.try_get("update_attempts").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_message: Option<String> =
        row.try_get("status_message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lease_until_str: Option<String> =
        row.try_get("lease_until").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_updated_at_str: String =
        row.try_get("last_updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let snapshot: FieldSnapshot = serde_json::from_str(&snapshot_json)
        .map_err(|e| RepositoryError::Decode(format!("field_snapshot: {e}")))?;
    let captured_inputs: Vec<String> = serde_json::from_str(&captured_inputs_json)
        .map_err(|e| RepositoryError::Decode(format!("captured_inputs: {e}")))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let last_updated_at = DateTime::parse_from_rfc3339(&last_updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let lease_until = lease_until_str
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(LeadRecord {
        session_id: SessionId(session_id),
        lead_id: lead_id.map(LeadId),
        snapshot,
        summary,
        captured_inputs,
        creation_attempts: creation_attempts.max(0) as u32,
        update_attempts: update_attempts.max(0) as u32,
        status: LeadStatus::parse(&status_str),
        status_message,
        lease_until,
        created_at,
        last_updated_at,
    })
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find(&self, session_id: &SessionId) -> Result<Option<LeadRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead_records WHERE session_id = ?"
        ))
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_lead(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: LeadRecord) -> Result<(), RepositoryError> {
        let snapshot_json = serde_json::to_string(&record.snapshot)
            .map_err(|e| RepositoryError::Decode(format!("field_snapshot: {e}")))?;
        let captured_inputs_json = serde_json::to_string(&record.captured_inputs)
            .map_err(|e| RepositoryError::Decode(format!("captured_inputs: {e}")))?;
        let lead_id = record.lead_id.as_ref().map(|id| id.0.clone());
        let lease_until = record.lease_until.map(|dt| dt.to_rfc3339());

        sqlx::query(
            "INSERT INTO lead_records (session_id, lead_id, field_snapshot, summary,
                                       captured_inputs, creation_attempts, update_attempts,
                                       status, status_message, lease_until, created_at,
                                       last_updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 lead_id = excluded.lead_id,
                 field_snapshot = excluded.field_snapshot,
                 summary = excluded.summary,
                 captured_inputs = excluded.captured_inputs,
                 creation_attempts = excluded.creation_attempts,
                 update_attempts = excluded.update_attempts,
                 status = excluded.status,
                 status_message = excluded.status_message,
                 lease_until = excluded.lease_until,
                 last_updated_at = excluded.last_updated_at",
        )
        .bind(&record.session_id.0)
        .bind(&lead_id)
        .bind(&snapshot_json)
        .bind(&record.summary)
        .bind(&captured_inputs_json)
        .bind(record.creation_attempts as i64)
        .bind(record.update_attempts as i64)
        .bind(record.status.as_str())
        .bind(&record.status_message)
        .bind(&lease_until)
        .bind(record.created_at.to_rfc3339())
        .bind(record.last_updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_unlinked(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead_records
             WHERE lead_id IS NULL AND creation_attempts < ?
             ORDER BY last_updated_at ASC"
        ))
        .bind(max_attempts as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect()
    }

    async fn list_recently_linked(
        &self,
        updated_after: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead_records
             WHERE lead_id IS NOT NULL AND last_updated_at >= ? AND update_attempts < ?
             ORDER BY last_updated_at ASC"
        ))
        .bind(updated_after.to_rfc3339())
        .bind(max_attempts as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect()
    }

    async fn list_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead_records
             WHERE lead_id = ? ORDER BY last_updated_at DESC"
        ))
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect()
    }

    async fn try_claim(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE lead_records SET lease_until = ?
             WHERE session_id = ? AND (lease_until IS NULL OR lease_until < ?)",
        )
        .bind(lease_until.to_rfc3339())
        .bind(&session_id.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE lead_records SET lease_until = NULL WHERE session_id = ?")
            .bind(&session_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use leadflow_core::domain::lead::{LeadId, LeadRecord, LeadStatus, SessionId};

    use super::SqlLeadRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::LeadRepository;

    async fn repo() -> SqlLeadRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .expect("in-memory database should connect");
        run_pending(&pool).await.expect("migrations should apply");
        SqlLeadRepository::new(pool)
    }

    fn record(session: &str) -> LeadRecord {
        LeadRecord::empty(SessionId(session.to_string()))
    }

    #[tokio::test]
    async fn save_and_find_round_trips_optional_fields() {
        let repo = repo().await;
        let mut lead = record("s-1");
        lead.lead_id = Some(LeadId("00Q1".to_string()));
        lead.summary = Some("User: hi".to_string());
        lead.captured_inputs = vec!["hi".to_string()];
        lead.status = LeadStatus::Created;
        lead.creation_attempts = 1;

        repo.save(lead.clone()).await.expect("save should succeed");
        let found = repo
            .find(&SessionId("s-1".to_string()))
            .await
            .expect("find should succeed")
            .expect("record should exist");

        assert_eq!(found.lead_id, Some(LeadId("00Q1".to_string())));
        assert_eq!(found.summary.as_deref(), Some("User: hi"));
        assert_eq!(found.captured_inputs, vec!["hi".to_string()]);
        assert_eq!(found.status, LeadStatus::Created);
        assert_eq!(found.creation_attempts, 1);
    }

    #[tokio::test]
    async fn unlinked_listing_respects_attempt_cap() {
        let repo = repo().await;

        let fresh = record("s-fresh");
        let mut exhausted = record("s-exhausted");
        exhausted.creation_attempts = 4;
        let mut linked = record("s-linked");
        linked.lead_id = Some(LeadId("00Q9".to_string()));

        for lead in [fresh, exhausted, linked] {
            repo.save(lead).await.expect("save should succeed");
        }

        let candidates = repo.list_unlinked(4).await.expect("listing should succeed");
        let sessions: Vec<&str> =
            candidates.iter().map(|lead| lead.session_id.0.as_str()).collect();
        assert_eq!(sessions, vec!["s-fresh"]);
    }

    #[tokio::test]
    async fn recently_linked_listing_applies_window_and_cap() {
        let repo = repo().await;
        let now = Utc::now();

        let mut recent = record("s-recent");
        recent.lead_id = Some(LeadId("00Q1".to_string()));

        let mut stale = record("s-stale");
        stale.lead_id = Some(LeadId("00Q2".to_string()));
        stale.last_updated_at = now - Duration::hours(72);

        let mut capped = record("s-capped");
        capped.lead_id = Some(LeadId("00Q3".to_string()));
        capped.update_attempts = 4;

        for lead in [recent, stale, capped] {
            repo.save(lead).await.expect("save should succeed");
        }

        let cutoff = now - Duration::hours(48);
        let candidates =
            repo.list_recently_linked(cutoff, 4).await.expect("listing should succeed");
        let sessions: Vec<&str> =
            candidates.iter().map(|lead| lead.session_id.0.as_str()).collect();
        assert_eq!(sessions, vec!["s-recent"]);
    }

    #[tokio::test]
    async fn sessions_sharing_a_lead_sort_newest_first() {
        let repo = repo().await;
        let now = Utc::now();

        let mut older = record("s-older");
        older.lead_id = Some(LeadId("00Q1".to_string()));
        older.last_updated_at = now - Duration::hours(5);

        let mut newer = record("s-newer");
        newer.lead_id = Some(LeadId("00Q1".to_string()));
        newer.last_updated_at = now;

        repo.save(older).await.expect("save should succeed");
        repo.save(newer).await.expect("save should succeed");

        let records = repo
            .list_by_lead_id(&LeadId("00Q1".to_string()))
            .await
            .expect("listing should succeed");
        let sessions: Vec<&str> =
            records.iter().map(|lead| lead.session_id.0.as_str()).collect();
        assert_eq!(sessions, vec!["s-newer", "s-older"]);
    }

    #[tokio::test]
    async fn lease_claim_is_exclusive_until_released_or_expired() {
        let repo = repo().await;
        let now = Utc::now();
        let session = SessionId("s-1".to_string());

        repo.save(record("s-1")).await.expect("save should succeed");

        let lease_until = now + Duration::seconds(300);
        assert!(repo
            .try_claim(&session, now, lease_until)
            .await
            .expect("first claim should succeed"));
        assert!(!repo
            .try_claim(&session, now, lease_until)
            .await
            .expect("second claim should be refused"));

        // An expired lease can be stolen.
        let later = lease_until + Duration::seconds(1);
        assert!(repo
            .try_claim(&session, later, later + Duration::seconds(300))
            .await
            .expect("expired lease should be claimable"));

        repo.release(&session).await.expect("release should succeed");
        assert!(repo
            .try_claim(&session, now, lease_until)
            .await
            .expect("released lease should be claimable"));
    }
}
