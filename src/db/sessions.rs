//! Upload session persistence

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// One upload attempt's ephemeral authorization.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub session_key: String,
    pub file_id: String,
    pub status: String,
    pub metadata: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Serialized into the session's metadata column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub chunk_size: i64,
    pub total_chunks: i64,
}

/// Session repository
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_key(&self, session_key: &str) -> Result<Option<SessionRecord>> {
        let session = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT id, session_key, file_id, status, metadata, created_at, expires_at
            FROM upload_sessions
            WHERE session_key = ?
            "#,
        )
        .bind(session_key)
        .fetch_optional(self.pool)
        .await?;

        Ok(session)
    }

    /// The single named active→expired transition. Only flips a session that
    /// is still active; returns whether this call performed the flip.
    pub async fn expire_if_active(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = 'expired' WHERE id = ? AND status = 'active'",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a session completed after assembly.
    pub async fn complete(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE upload_sessions SET status = 'completed' WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Sessions past their expiry that never left the active state.
    pub async fn list_expired_active(&self, now: &str) -> Result<Vec<SessionRecord>> {
        let sessions = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT id, session_key, file_id, status, metadata, created_at, expires_at
            FROM upload_sessions
            WHERE expires_at < ? AND status = 'active'
            "#,
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(sessions)
    }

    /// Remove a session outright. Sessions carry no blob objects of their
    /// own, so the sweeper deletes rather than gates them.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Build a new active session record.
pub fn new_session_record(
    session_key: String,
    file_id: String,
    metadata: &SessionMetadata,
    expires_at: String,
) -> SessionRecord {
    SessionRecord {
        id: Uuid::new_v4().to_string(),
        session_key,
        file_id,
        status: "active".to_string(),
        metadata: serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string()),
        created_at: Utc::now().to_rfc3339(),
        expires_at,
    }
}
