//! Access request persistence

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// A recipient's request for a decryption key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessRequestRecord {
    pub id: String,
    pub request_id: String,
    pub file_id: String,
    pub reason: Option<String>,
    pub status: String,
    pub ip_hash: String,
    pub created_at: String,
    pub approved_at: Option<String>,
    pub rejected_at: Option<String>,
}

const REQUEST_COLUMNS: &str =
    "id, request_id, file_id, reason, status, ip_hash, created_at, approved_at, rejected_at";

/// Access request repository
pub struct RequestRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RequestRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        request_id: String,
        file_id: String,
        reason: Option<String>,
        ip_hash: String,
    ) -> Result<AccessRequestRecord> {
        let record = AccessRequestRecord {
            id: Uuid::new_v4().to_string(),
            request_id,
            file_id,
            reason,
            status: "pending".to_string(),
            ip_hash,
            created_at: Utc::now().to_rfc3339(),
            approved_at: None,
            rejected_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO access_requests (id, request_id, file_id, reason, status, ip_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.request_id)
        .bind(&record.file_id)
        .bind(&record.reason)
        .bind(&record.status)
        .bind(&record.ip_hash)
        .bind(&record.created_at)
        .execute(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_request_id(&self, request_id: &str) -> Result<Option<AccessRequestRecord>> {
        let request = sqlx::query_as::<_, AccessRequestRecord>(&format!(
            "SELECT {} FROM access_requests WHERE request_id = ?",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(request)
    }

    /// Pending request from the same hashed IP against the same file, if one
    /// exists. Creation is idempotent on this triple.
    pub async fn find_pending(
        &self,
        file_id: &str,
        ip_hash: &str,
    ) -> Result<Option<AccessRequestRecord>> {
        let request = sqlx::query_as::<_, AccessRequestRecord>(&format!(
            r#"
            SELECT {} FROM access_requests
            WHERE file_id = ? AND ip_hash = ? AND status = 'pending'
            LIMIT 1
            "#,
            REQUEST_COLUMNS
        ))
        .bind(file_id)
        .bind(ip_hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(request)
    }

    /// pending→approved. The WHERE clause makes the transition atomic: under
    /// concurrent approve/reject calls exactly one wins.
    pub async fn approve(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE access_requests
            SET status = 'approved', approved_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// pending→rejected, same atomicity as [`approve`](Self::approve).
    pub async fn reject(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE access_requests
            SET status = 'rejected', rejected_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_file(&self, file_id: &str) -> Result<Vec<AccessRequestRecord>> {
        let requests = sqlx::query_as::<_, AccessRequestRecord>(&format!(
            r#"
            SELECT {} FROM access_requests
            WHERE file_id = ?
            ORDER BY created_at DESC
            "#,
            REQUEST_COLUMNS
        ))
        .bind(file_id)
        .fetch_all(self.pool)
        .await?;

        Ok(requests)
    }

    pub async fn count_for_file(&self, file_id: &str) -> Result<(i64, i64)> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_requests WHERE file_id = ?")
                .bind(file_id)
                .fetch_one(self.pool)
                .await?;

        let pending: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM access_requests WHERE file_id = ? AND status = 'pending'",
        )
        .bind(file_id)
        .fetch_one(self.pool)
        .await?;

        Ok((total.0, pending.0))
    }
}
