//! Download audit log persistence

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Download log repository. Rows are append-only.
pub struct DownloadLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DownloadLogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of distinct access requests that have downloaded this file.
    /// This, not the raw row count, is what the download ceiling compares
    /// against: one request retrying a download never burns a second slot.
    pub async fn distinct_downloaders(&self, file_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT request_id) FROM download_logs WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count.0)
    }

    /// Quota check and audit insert as one atomic unit. Returns false when
    /// the distinct-requester count has already reached `max_downloads`, in
    /// which case nothing is written. Running both inside one transaction
    /// keeps the ceiling exact under concurrent downloads.
    pub async fn record_within_quota(
        &self,
        file_id: &str,
        access_request_pk: &str,
        ip_hash: &str,
        max_downloads: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT request_id) FROM download_logs WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_one(&mut *tx)
        .await?;

        if count.0 >= max_downloads {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO download_logs (id, file_id, request_id, ip_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(file_id)
        .bind(access_request_pk)
        .bind(ip_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Raw number of content releases for a file.
    pub async fn count_for_file(&self, file_id: &str) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM download_logs WHERE file_id = ?")
                .bind(file_id)
                .fetch_one(self.pool)
                .await?;

        Ok(count.0)
    }
}
