//! File and chunk persistence

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

use super::sessions::SessionRecord;

/// One logical shared object.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: String,
    pub share_id: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub encrypted_key: String,
    pub storage_key: String,
    pub upload_status: String,
    pub chunk_count: i64,
    pub uploaded_chunks: i64,
    pub max_downloads: i64,
    pub blocks_requests: bool,
    pub blocks_downloads: bool,
    pub owner_id: String,
    pub created_at: String,
    pub expires_at: String,
}

/// One slice of a file during upload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChunkRecord {
    pub id: String,
    pub file_id: String,
    pub chunk_index: i64,
    pub size: i64,
    pub storage_key: String,
    pub uploaded_at: Option<String>,
}

const FILE_COLUMNS: &str = "id, share_id, filename, size, mime_type, encrypted_key, storage_key, \
     upload_status, chunk_count, uploaded_chunks, max_downloads, \
     blocks_requests, blocks_downloads, owner_id, created_at, expires_at";

/// File repository
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new upload: the file row, all of its chunk rows, and the
    /// upload session, in one transaction so a failure leaves no partial
    /// chunk set behind.
    pub async fn create_with_session(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
        session: &SessionRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (id, share_id, filename, size, mime_type, encrypted_key, storage_key,
                               upload_status, chunk_count, uploaded_chunks, max_downloads,
                               blocks_requests, blocks_downloads, owner_id, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.share_id)
        .bind(&file.filename)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.encrypted_key)
        .bind(&file.storage_key)
        .bind(&file.upload_status)
        .bind(file.chunk_count)
        .bind(file.uploaded_chunks)
        .bind(file.max_downloads)
        .bind(file.blocks_requests)
        .bind(file.blocks_downloads)
        .bind(&file.owner_id)
        .bind(&file.created_at)
        .bind(&file.expires_at)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO file_chunks (id, file_id, chunk_index, size, storage_key, uploaded_at)
                VALUES (?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.file_id)
            .bind(chunk.chunk_index)
            .bind(chunk.size)
            .bind(&chunk.storage_key)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO upload_sessions (id, session_key, file_id, status, metadata, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.session_key)
        .bind(&session.file_id)
        .bind(&session.status)
        .bind(&session.metadata)
        .bind(&session.created_at)
        .bind(&session.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM files WHERE id = ?",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    pub async fn get_by_share_id(&self, share_id: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM files WHERE share_id = ?",
            FILE_COLUMNS
        ))
        .bind(share_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// Record a confirmed chunk and return the new uploaded count. When the
    /// count reaches parity the status moves to `new_status_at_parity`.
    pub async fn increment_uploaded_chunks(
        &self,
        id: &str,
        new_status_at_parity: &str,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            UPDATE files
            SET uploaded_chunks = uploaded_chunks + 1,
                upload_status = CASE
                    WHEN uploaded_chunks + 1 = chunk_count THEN ?
                    ELSE upload_status
                END
            WHERE id = ?
            "#,
        )
        .bind(new_status_at_parity)
        .bind(id)
        .execute(self.pool)
        .await?;

        let count: (i64,) = sqlx::query_as("SELECT uploaded_chunks FROM files WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        Ok(count.0)
    }

    /// Record a completed assembly: encrypted key, final storage key, status.
    pub async fn mark_completed(
        &self,
        id: &str,
        encrypted_key: &str,
        storage_key: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET encrypted_key = ?, storage_key = ?, upload_status = 'completed'
            WHERE id = ?
            "#,
        )
        .bind(encrypted_key)
        .bind(storage_key)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Flip gate booleans. The gates are monotonic: callers only ever set
    /// them to true, and the SQL never clears an already-set gate.
    pub async fn set_gates(
        &self,
        id: &str,
        blocks_requests: Option<bool>,
        blocks_downloads: Option<bool>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET blocks_requests = blocks_requests OR COALESCE(?, 0),
                blocks_downloads = blocks_downloads OR COALESCE(?, 0)
            WHERE id = ?
            "#,
        )
        .bind(blocks_requests)
        .bind(blocks_downloads)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Files whose expiry has passed and whose gates are not both set yet.
    pub async fn list_expired_ungated(&self, now: &str) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            SELECT {} FROM files
            WHERE expires_at < ? AND (blocks_requests = 0 OR blocks_downloads = 0)
            "#,
            FILE_COLUMNS
        ))
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Most recently created files for an owner.
    pub async fn list_recent(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            SELECT {} FROM files
            WHERE owner_id = ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    pub async fn count_for_owner(&self, owner_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count.0)
    }
}

/// Chunk repository
pub struct ChunkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChunkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, file_id: &str, chunk_index: i64) -> Result<Option<ChunkRecord>> {
        let chunk = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT id, file_id, chunk_index, size, storage_key, uploaded_at
            FROM file_chunks
            WHERE file_id = ? AND chunk_index = ?
            "#,
        )
        .bind(file_id)
        .bind(chunk_index)
        .fetch_optional(self.pool)
        .await?;

        Ok(chunk)
    }

    /// All chunks of a file in ascending index order. Assembly depends on
    /// this ordering.
    pub async fn list_for_file(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT id, file_id, chunk_index, size, storage_key, uploaded_at
            FROM file_chunks
            WHERE file_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(file_id)
        .fetch_all(self.pool)
        .await?;

        Ok(chunks)
    }

    /// Stamp a chunk as uploaded. Returns false when the chunk was already
    /// stamped, which is how concurrent duplicate confirmations lose the
    /// race without double counting.
    pub async fn mark_uploaded(&self, chunk_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE file_chunks SET uploaded_at = ? WHERE id = ? AND uploaded_at IS NULL",
        )
        .bind(&now)
        .bind(chunk_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop all chunk rows of a file after assembly.
    pub async fn delete_for_file(&self, file_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Build a new file record in the `uploading` state.
pub fn new_file_record(
    share_id: String,
    filename: String,
    size: i64,
    mime_type: String,
    chunk_count: i64,
    max_downloads: i64,
    owner_id: String,
    expires_at: String,
) -> FileRecord {
    FileRecord {
        id: Uuid::new_v4().to_string(),
        share_id,
        filename,
        size,
        mime_type,
        encrypted_key: String::new(),
        storage_key: String::new(),
        upload_status: "uploading".to_string(),
        chunk_count,
        uploaded_chunks: 0,
        max_downloads,
        blocks_requests: false,
        blocks_downloads: false,
        owner_id,
        created_at: Utc::now().to_rfc3339(),
        expires_at,
    }
}
