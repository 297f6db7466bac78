use chrono::{DateTime, Utc};
use sqlx::Row;

use leadflow_core::domain::lead::SessionId;
use leadflow_core::domain::transcript::{Transcript, Turn};

use super::{RepositoryError, TranscriptRepository};
use crate::DbPool;

pub struct SqlTranscriptRepository {
    pool: DbPool,
}

impl SqlTranscriptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_transcript(row: &sqlx::sqlite::SqliteRow) -> Result<Transcript, RepositoryError> {
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let turns_json: String =
        row.try_get("turns").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let turns: Vec<Turn> = serde_json::from_str(&turns_json)
        .map_err(|e| RepositoryError::Decode(format!("turns: {e}")))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Transcript { session_id: SessionId(session_id), turns, created_at, updated_at })
}

#[async_trait::async_trait]
impl TranscriptRepository for SqlTranscriptRepository {
    async fn find(&self, session_id: &SessionId) -> Result<Option<Transcript>, RepositoryError> {
        let row = sqlx::query(
            "SELECT session_id, turns, created_at, updated_at
             FROM transcripts WHERE session_id = ?",
        )
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_transcript(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, transcript: Transcript) -> Result<(), RepositoryError> {
        let turns_json = serde_json::to_string(&transcript.turns)
            .map_err(|e| RepositoryError::Decode(format!("turns: {e}")))?;

        sqlx::query(
            "INSERT INTO transcripts (session_id, turns, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 turns = excluded.turns,
                 updated_at = excluded.updated_at",
        )
        .bind(&transcript.session_id.0)
        .bind(&turns_json)
        .bind(transcript.created_at.to_rfc3339())
        .bind(transcript.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::domain::lead::SessionId;
    use leadflow_core::domain::transcript::{Transcript, Turn};

    use super::SqlTranscriptRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::TranscriptRepository;

    #[tokio::test]
    async fn save_preserves_turn_order_and_roles() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .expect("in-memory database should connect");
        run_pending(&pool).await.expect("migrations should apply");
        let repo = SqlTranscriptRepository::new(pool);

        let mut transcript = Transcript::new(SessionId("s-1".to_string()));
        transcript.push(Turn::user("hello"));
        transcript.push(Turn::assistant("hi there"));
        transcript.push(Turn::user("my email is a@b.com"));

        repo.save(transcript.clone()).await.expect("save should succeed");

        let found = repo
            .find(&SessionId("s-1".to_string()))
            .await
            .expect("find should succeed")
            .expect("transcript should exist");

        assert_eq!(found.turns, transcript.turns);
        assert_eq!(found.user_inputs(), vec!["hello", "my email is a@b.com"]);
    }
}
