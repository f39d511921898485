//! Upload Session Manager
//!
//! Owns the lifecycle of a chunked-upload session: creation with presigned
//! chunk targets, per-chunk confirmation, and lazy expiry. All state lives in
//! the database; concurrent confirmations coordinate through conditional
//! UPDATEs, never in-process locks.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::billing::BillingProvider;
use crate::config::UploadConfig;
use crate::db::{
    new_file_record, new_session_record, ChunkRecord, ChunkRepository, FileRepository,
    SessionMetadata, SessionRecord, SessionRepository,
};
use crate::error::{AppError, Result};
use crate::security::Security;
use crate::storage::ObjectStore;

use super::types::{
    ChunkUploadRequest, ChunkUploadResponse, FileStatus, InitiateUploadRequest,
    InitiateUploadResponse, SessionStatus, MAX_CHUNK_SIZE, MAX_DOWNLOADS_CEILING,
    MAX_EXPIRES_IN_HOURS, MIN_CHUNK_SIZE,
};

/// Manages upload sessions
#[derive(Clone)]
pub struct UploadService {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    security: Security,
    billing: Arc<dyn BillingProvider>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn ObjectStore>,
        security: Security,
        billing: Arc<dyn BillingProvider>,
        config: UploadConfig,
    ) -> Self {
        Self {
            db,
            store,
            security,
            billing,
            config,
        }
    }

    /// Start a chunked upload: create the file, its chunk set, and an active
    /// session, and hand back one presigned PUT URL per chunk.
    pub async fn initiate(
        &self,
        owner_id: &str,
        request: InitiateUploadRequest,
    ) -> Result<InitiateUploadResponse> {
        validate_initiate(&request)?;

        let limits = self.billing.get_limits(owner_id).await?;
        let max_size = limits.max_file_size.min(self.config.max_file_size);
        if request.size > max_size {
            return Err(AppError::SizeExceeded {
                size: request.size,
                max: max_size,
            });
        }

        let chunk_count = chunk_count_for(request.size, request.chunk_size);

        let share_id = self.security.generate_share_id();
        let session_key = self.security.generate_session_key();

        let file = new_file_record(
            share_id.clone(),
            request.filename.clone(),
            request.size,
            request.mime_type.clone(),
            chunk_count,
            request.max_downloads,
            owner_id.to_string(),
            self.security.calculate_expiry(request.expires_in_hours),
        );

        let mut chunks = Vec::with_capacity(chunk_count as usize);
        let mut chunk_urls = Vec::with_capacity(chunk_count as usize);
        for index in 0..chunk_count {
            let storage_key = self.security.chunk_key(&file.id, index);

            let url = self
                .store
                .presign_put(&storage_key, Duration::from_secs(self.config.presign_ttl_secs))
                .await?;
            chunk_urls.push(url);

            chunks.push(ChunkRecord {
                id: Uuid::new_v4().to_string(),
                file_id: file.id.clone(),
                chunk_index: index,
                size: chunk_size_at(request.size, request.chunk_size, index),
                storage_key,
                uploaded_at: None,
            });
        }

        // Sessions expire on their own fixed window, not the file's.
        let session = new_session_record(
            session_key.clone(),
            file.id.clone(),
            &SessionMetadata {
                chunk_size: request.chunk_size,
                total_chunks: chunk_count,
            },
            self.security.calculate_expiry(self.config.session_expire_hours),
        );

        FileRepository::new(&self.db)
            .create_with_session(&file, &chunks, &session)
            .await?;

        tracing::info!(
            file_id = %file.id,
            share_id = %share_id,
            filename = %request.filename,
            size = request.size,
            chunks = chunk_count,
            "Upload initiated"
        );

        Ok(InitiateUploadResponse {
            file_id: file.id,
            share_id,
            session_key,
            chunk_count,
            chunk_urls,
        })
    }

    /// Confirm that a chunk's bytes have been produced by the client.
    ///
    /// Idempotent: confirming an already-confirmed chunk returns the current
    /// counts without a second blob write or counter increment, so client
    /// retries are safe.
    pub async fn confirm_chunk(&self, request: ChunkUploadRequest) -> Result<ChunkUploadResponse> {
        let sessions = SessionRepository::new(&self.db);

        let session = sessions
            .get_by_key(&request.session_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Upload session not found".to_string()))?;

        self.ensure_session_active(&sessions, &session).await?;

        let files = FileRepository::new(&self.db);
        let file = files
            .get(&session.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if request.chunk_index < 0 || request.chunk_index >= file.chunk_count {
            return Err(AppError::BadRequest("Invalid chunk index".to_string()));
        }

        let chunk_repo = ChunkRepository::new(&self.db);
        let chunk = chunk_repo
            .get(&file.id, request.chunk_index)
            .await?
            .ok_or_else(|| AppError::BadRequest("Chunk not found".to_string()))?;

        if chunk.uploaded_at.is_some() {
            return Ok(ChunkUploadResponse {
                chunk_index: request.chunk_index,
                uploaded_chunks: file.uploaded_chunks,
                total_chunks: file.chunk_count,
                is_complete: file.uploaded_chunks == file.chunk_count,
            });
        }

        let data = BASE64
            .decode(&request.chunk_data)
            .map_err(|_| AppError::BadRequest("Invalid base64 encoded data".to_string()))?;

        // Blob write happens outside any database transaction. On failure the
        // chunk stays unconfirmed and the client can retry.
        self.store
            .put(&chunk.storage_key, data, "application/octet-stream")
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store chunk: {}", e)))?;

        if !chunk_repo.mark_uploaded(&chunk.id).await? {
            // A concurrent confirmation won the race; report its result.
            let file = files
                .get(&file.id)
                .await?
                .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
            return Ok(ChunkUploadResponse {
                chunk_index: request.chunk_index,
                uploaded_chunks: file.uploaded_chunks,
                total_chunks: file.chunk_count,
                is_complete: file.uploaded_chunks == file.chunk_count,
            });
        }

        let uploaded_chunks = files
            .increment_uploaded_chunks(&file.id, FileStatus::ChunksReceived.as_str())
            .await?;
        let is_complete = uploaded_chunks >= file.chunk_count;

        tracing::debug!(
            file_id = %file.id,
            chunk_index = request.chunk_index,
            uploaded_chunks = uploaded_chunks,
            total_chunks = file.chunk_count,
            "Chunk confirmed"
        );

        Ok(ChunkUploadResponse {
            chunk_index: request.chunk_index,
            uploaded_chunks,
            total_chunks: file.chunk_count,
            is_complete,
        })
    }

    /// Gate a session operation on the session still being usable, expiring
    /// it through the single named transition when its window has passed.
    async fn ensure_session_active(
        &self,
        sessions: &SessionRepository<'_>,
        session: &SessionRecord,
    ) -> Result<()> {
        if session.status != SessionStatus::Active.as_str() {
            return Err(AppError::Gone("Upload session is no longer active".to_string()));
        }

        if self.security.is_expired(&session.expires_at) {
            sessions.expire_if_active(&session.id).await?;
            tracing::info!(session_id = %session.id, "Upload session expired");
            return Err(AppError::Gone("Upload session expired".to_string()));
        }

        Ok(())
    }
}

/// Number of chunks needed to carry `size` bytes.
pub fn chunk_count_for(size: i64, chunk_size: i64) -> i64 {
    (size + chunk_size - 1) / chunk_size
}

/// Size of the chunk at `index`; the final chunk carries the remainder.
pub fn chunk_size_at(size: i64, chunk_size: i64, index: i64) -> i64 {
    (size - index * chunk_size).min(chunk_size)
}

fn validate_initiate(request: &InitiateUploadRequest) -> Result<()> {
    if request.filename.is_empty() || request.filename.len() > 255 {
        return Err(AppError::BadRequest("Invalid filename".to_string()));
    }
    if request.size <= 0 {
        return Err(AppError::BadRequest("File size must be positive".to_string()));
    }
    if request.chunk_size < MIN_CHUNK_SIZE || request.chunk_size > MAX_CHUNK_SIZE {
        return Err(AppError::BadRequest(format!(
            "Chunk size must be between {} and {} bytes",
            MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
        )));
    }
    if request.expires_in_hours < 1 || request.expires_in_hours > MAX_EXPIRES_IN_HOURS {
        return Err(AppError::BadRequest(format!(
            "Expiry must be between 1 and {} hours",
            MAX_EXPIRES_IN_HOURS
        )));
    }
    if request.max_downloads < 1 || request.max_downloads > MAX_DOWNLOADS_CEILING {
        return Err(AppError::BadRequest(format!(
            "Max downloads must be between 1 and {}",
            MAX_DOWNLOADS_CEILING
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::FixedPlanProvider;
    use crate::config::Config;
    use crate::storage::MemoryObjectStore;

    async fn test_service() -> (UploadService, Arc<MemoryObjectStore>) {
        let pool = crate::db::create_memory_pool().await.unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let config = Config::default();
        let service = UploadService::new(
            pool,
            store.clone(),
            Security::new("test-salt"),
            Arc::new(FixedPlanProvider::new(config.upload.max_file_size)),
            config.upload,
        );
        (service, store)
    }

    fn initiate_request(size: i64, chunk_size: i64) -> InitiateUploadRequest {
        InitiateUploadRequest {
            filename: "report.pdf.enc".to_string(),
            size,
            mime_type: "application/pdf".to_string(),
            chunk_size,
            expires_in_hours: 24,
            max_downloads: 3,
        }
    }

    fn confirm_request(session_key: &str, index: i64, data: &[u8]) -> ChunkUploadRequest {
        ChunkUploadRequest {
            session_key: session_key.to_string(),
            chunk_index: index,
            chunk_data: BASE64.encode(data),
        }
    }

    #[test]
    fn chunk_arithmetic_covers_the_whole_file() {
        for (size, chunk_size) in [
            (10_485_760i64, 5_242_880i64),
            (10_485_761, 5_242_880),
            (1, 1024 * 1024),
            (5_242_880, 5_242_880),
        ] {
            let count = chunk_count_for(size, chunk_size);
            assert_eq!(count, (size as f64 / chunk_size as f64).ceil() as i64);

            let last = chunk_size_at(size, chunk_size, count - 1);
            assert_eq!(last, size - (count - 1) * chunk_size);

            let total: i64 = (0..count).map(|i| chunk_size_at(size, chunk_size, i)).sum();
            assert_eq!(total, size);
        }
    }

    #[tokio::test]
    async fn initiate_creates_file_chunks_and_session() {
        let (service, _) = test_service().await;

        let response = service
            .initiate("user-1", initiate_request(10_485_760, 5_242_880))
            .await
            .unwrap();

        assert_eq!(response.chunk_count, 2);
        assert_eq!(response.chunk_urls.len(), 2);
        assert_eq!(response.share_id.len(), 12);

        let sessions = SessionRepository::new(service.db());
        let session = sessions
            .get_by_key(&response.session_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, "active");

        let file = FileRepository::new(service.db())
            .get(&response.file_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.upload_status, "uploading");
        assert_eq!(file.uploaded_chunks, 0);
        assert!(file.encrypted_key.is_empty());
        assert!(file.storage_key.is_empty());
    }

    #[tokio::test]
    async fn initiate_rejects_oversized_files() {
        let (service, _) = test_service().await;

        let result = service
            .initiate("user-1", initiate_request(600 * 1024 * 1024, 5_242_880))
            .await;

        assert!(matches!(result, Err(AppError::SizeExceeded { .. })));
    }

    #[tokio::test]
    async fn confirm_chunk_is_idempotent() {
        let (service, store) = test_service().await;

        let response = service
            .initiate("user-1", initiate_request(4 * 1024 * 1024, 2 * 1024 * 1024))
            .await
            .unwrap();

        let first = service
            .confirm_chunk(confirm_request(&response.session_key, 0, b"chunk-0"))
            .await
            .unwrap();
        assert_eq!(first.uploaded_chunks, 1);
        assert!(!first.is_complete);

        let key = format!("files/{}/chunks/0000", response.file_id);
        assert!(store.contains(&key).await);

        let second = service
            .confirm_chunk(confirm_request(&response.session_key, 0, b"chunk-0"))
            .await
            .unwrap();
        assert_eq!(second.uploaded_chunks, 1);
        assert!(!second.is_complete);
    }

    #[tokio::test]
    async fn confirm_chunk_reports_completion_at_parity() {
        let (service, _) = test_service().await;

        let response = service
            .initiate("user-1", initiate_request(4 * 1024 * 1024, 2 * 1024 * 1024))
            .await
            .unwrap();

        service
            .confirm_chunk(confirm_request(&response.session_key, 1, b"chunk-1"))
            .await
            .unwrap();
        let done = service
            .confirm_chunk(confirm_request(&response.session_key, 0, b"chunk-0"))
            .await
            .unwrap();

        assert_eq!(done.uploaded_chunks, 2);
        assert!(done.is_complete);

        // Parity flips the provisional chunks_received status, not completed:
        // the file only becomes downloadable after assembly.
        let file = FileRepository::new(service.db())
            .get(&response.file_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.upload_status, "chunks_received");
    }

    #[tokio::test]
    async fn confirm_chunk_rejects_unknown_session() {
        let (service, _) = test_service().await;

        let result = service
            .confirm_chunk(confirm_request("no-such-session", 0, b"data"))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn confirm_chunk_rejects_out_of_range_index() {
        let (service, _) = test_service().await;

        let response = service
            .initiate("user-1", initiate_request(1024 * 1024, 1024 * 1024))
            .await
            .unwrap();

        let result = service
            .confirm_chunk(confirm_request(&response.session_key, 5, b"data"))
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn confirm_chunk_expires_stale_sessions() {
        let (service, _) = test_service().await;

        let response = service
            .initiate("user-1", initiate_request(1024 * 1024, 1024 * 1024))
            .await
            .unwrap();

        // Age the session past its window.
        sqlx::query("UPDATE upload_sessions SET expires_at = ? WHERE session_key = ?")
            .bind("2000-01-01T00:00:00+00:00")
            .bind(&response.session_key)
            .execute(service.db())
            .await
            .unwrap();

        let result = service
            .confirm_chunk(confirm_request(&response.session_key, 0, b"data"))
            .await;
        assert!(matches!(result, Err(AppError::Gone(_))));

        // The lazy transition is persisted, not just observed.
        let session = SessionRepository::new(service.db())
            .get_by_key(&response.session_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, "expired");
    }

    impl UploadService {
        pub(crate) fn db(&self) -> &SqlitePool {
            &self.db
        }
    }
}
