//! Download Authorization Gate

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::{DownloadLogRepository, FileRepository, RequestRepository};
use crate::error::{AppError, Result};
use crate::requests::RequestStatus;
use crate::security::Security;
use crate::storage::ObjectStore;
use crate::upload::FileStatus;

/// Authorized content release
pub struct DownloadPayload {
    pub data: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
}

/// Authorizes downloads and key releases against approved requests
#[derive(Clone)]
pub struct DownloadService {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    security: Security,
}

impl DownloadService {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, security: Security) -> Self {
        Self { db, store, security }
    }

    /// Authorize a content download and record it.
    ///
    /// The quota counts distinct access requests, not download events: a
    /// request re-downloading never burns a second slot, and the check+log
    /// run in one transaction so concurrent callers cannot overshoot the
    /// ceiling.
    pub async fn authorize(&self, request_id: &str, client_ip: &str) -> Result<DownloadPayload> {
        let request = RequestRepository::new(&self.db)
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if request.status != RequestStatus::Approved.as_str() {
            return Err(AppError::Forbidden("Request not approved".to_string()));
        }

        let file = FileRepository::new(&self.db)
            .get(&request.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if file.upload_status != FileStatus::Completed.as_str() {
            return Err(AppError::BadRequest(
                "File is not ready for download".to_string(),
            ));
        }

        if file.blocks_downloads {
            tracing::warn!(file_id = %file.id, "Download attempt against blocked file");
            return Err(AppError::Gone("File downloads are blocked".to_string()));
        }

        if self.security.is_expired(&file.expires_at) {
            tracing::warn!(file_id = %file.id, expires_at = %file.expires_at, "Download attempt against expired file");
            return Err(AppError::Gone("File has expired".to_string()));
        }

        let ip_hash = self.security.hash_ip(client_ip);

        let recorded = DownloadLogRepository::new(&self.db)
            .record_within_quota(&file.id, &request.id, &ip_hash, file.max_downloads)
            .await?;
        if !recorded {
            tracing::warn!(
                file_id = %file.id,
                max_downloads = file.max_downloads,
                "Download limit exceeded"
            );
            return Err(AppError::Gone("Download limit exceeded".to_string()));
        }

        tracing::info!(
            file_id = %file.id,
            request_id = %request.request_id,
            "Download authorized"
        );

        let data = self.store.get(&file.storage_key).await?;

        Ok(DownloadPayload {
            data,
            filename: file.filename,
            mime_type: file.mime_type,
            size: file.size,
        })
    }

    /// Release the stored encrypted content key to an approved requester.
    ///
    /// Intentionally not counted against the download ceiling: the content
    /// download already consumed the slot, and a client retrying the key
    /// fetch after streaming content must not be stranded.
    pub async fn release_key(&self, request_id: &str) -> Result<String> {
        let request = RequestRepository::new(&self.db)
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if request.status != RequestStatus::Approved.as_str() {
            return Err(AppError::Forbidden("Request not approved".to_string()));
        }

        let file = FileRepository::new(&self.db)
            .get(&request.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if file.blocks_downloads {
            tracing::warn!(file_id = %file.id, "Key release attempt against blocked file");
            return Err(AppError::Gone("File downloads are blocked".to_string()));
        }

        tracing::info!(request_id = %request_id, "Decrypt key released");

        Ok(file.encrypted_key)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_file_record, new_session_record, SessionMetadata};
    use crate::requests::AccessRequestService;
    use crate::storage::MemoryObjectStore;

    struct Fixture {
        downloads: DownloadService,
        requests: AccessRequestService,
        db: SqlitePool,
        store: Arc<MemoryObjectStore>,
    }

    async fn fixture() -> Fixture {
        let db = crate::db::create_memory_pool().await.unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let security = Security::new("test-salt");

        Fixture {
            downloads: DownloadService::new(db.clone(), store.clone(), security.clone()),
            requests: AccessRequestService::new(db.clone(), security),
            db,
            store,
        }
    }

    /// Insert a completed file with stored content; returns (share_id, file_id).
    async fn seed_file(fixture: &Fixture, max_downloads: i64) -> (String, String) {
        let security = Security::new("test-salt");
        let share_id = security.generate_share_id();

        let mut file = new_file_record(
            share_id.clone(),
            "secret.bin.enc".to_string(),
            11,
            "application/octet-stream".to_string(),
            1,
            max_downloads,
            "owner-1".to_string(),
            security.calculate_expiry(24),
        );
        file.upload_status = "completed".to_string();
        file.uploaded_chunks = 1;
        file.encrypted_key = "wrapped-key".to_string();
        file.storage_key = format!("files/{}/file", file.id);

        fixture
            .store
            .put(&file.storage_key, b"ciphertext!".to_vec(), "application/octet-stream")
            .await
            .unwrap();

        let file_id = file.id.clone();
        FileRepository::new(&fixture.db)
            .create_with_session(
                &file,
                &[],
                &new_session_record(
                    security.generate_session_key(),
                    file.id.clone(),
                    &SessionMetadata { chunk_size: 11, total_chunks: 1 },
                    security.calculate_expiry(24),
                ),
            )
            .await
            .unwrap();

        (share_id, file_id)
    }

    async fn approved_request(fixture: &Fixture, share_id: &str, ip: &str) -> String {
        let outcome = fixture.requests.create(share_id, None, ip).await.unwrap();
        let request_id = outcome.record().request_id.clone();
        fixture.requests.approve(&request_id, "recipient-key").await.unwrap();
        request_id
    }

    #[tokio::test]
    async fn authorize_streams_content_and_logs_once() {
        let fixture = fixture().await;
        let (share_id, file_id) = seed_file(&fixture, 2).await;
        let request_id = approved_request(&fixture, &share_id, "10.0.0.1").await;

        let payload = fixture
            .downloads
            .authorize(&request_id, "10.0.0.1")
            .await
            .unwrap();
        assert_eq!(payload.data, b"ciphertext!");
        assert_eq!(payload.filename, "secret.bin.enc");

        let downloaders = DownloadLogRepository::new(&fixture.db)
            .distinct_downloaders(&file_id)
            .await
            .unwrap();
        assert_eq!(downloaders, 1);
    }

    #[tokio::test]
    async fn quota_counts_distinct_requests_not_rows() {
        let fixture = fixture().await;
        let (share_id, file_id) = seed_file(&fixture, 2).await;

        let r1 = approved_request(&fixture, &share_id, "10.0.0.1").await;
        fixture.downloads.authorize(&r1, "10.0.0.1").await.unwrap();
        // A retry by the same request fits under max_downloads=2 and must
        // not consume the second slot.
        fixture.downloads.authorize(&r1, "10.0.0.1").await.unwrap();

        assert_eq!(
            DownloadLogRepository::new(&fixture.db)
                .distinct_downloaders(&file_id)
                .await
                .unwrap(),
            1
        );

        // The second slot is still available to a different request.
        let r2 = approved_request(&fixture, &share_id, "10.0.0.2").await;
        fixture.downloads.authorize(&r2, "10.0.0.2").await.unwrap();
    }

    #[tokio::test]
    async fn quota_exhaustion_returns_gone() {
        let fixture = fixture().await;
        let (share_id, _) = seed_file(&fixture, 1).await;

        let r1 = approved_request(&fixture, &share_id, "10.0.0.1").await;
        fixture.downloads.authorize(&r1, "10.0.0.1").await.unwrap();

        // With the single slot consumed the ceiling holds for everyone,
        // including the request that consumed it.
        let r2_outcome = fixture.requests.create(&share_id, None, "10.0.0.2").await;
        assert!(matches!(r2_outcome, Err(AppError::Gone(_))));

        assert!(matches!(
            fixture.downloads.authorize(&r1, "10.0.0.1").await,
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn pending_requests_cannot_download() {
        let fixture = fixture().await;
        let (share_id, _) = seed_file(&fixture, 1).await;

        let outcome = fixture.requests.create(&share_id, None, "10.0.0.1").await.unwrap();
        let request_id = outcome.record().request_id.clone();

        assert!(matches!(
            fixture.downloads.authorize(&request_id, "10.0.0.1").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            fixture.downloads.release_key(&request_id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn blocked_downloads_gate_everything() {
        let fixture = fixture().await;
        let (share_id, file_id) = seed_file(&fixture, 5).await;
        let request_id = approved_request(&fixture, &share_id, "10.0.0.1").await;

        FileRepository::new(&fixture.db)
            .set_gates(&file_id, None, Some(true))
            .await
            .unwrap();

        assert!(matches!(
            fixture.downloads.authorize(&request_id, "10.0.0.1").await,
            Err(AppError::Gone(_))
        ));
        assert!(matches!(
            fixture.downloads.release_key(&request_id).await,
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn release_key_returns_stored_key_without_consuming_quota() {
        let fixture = fixture().await;
        let (share_id, file_id) = seed_file(&fixture, 1).await;
        let request_id = approved_request(&fixture, &share_id, "10.0.0.1").await;

        let key = fixture.downloads.release_key(&request_id).await.unwrap();
        assert_eq!(key, "wrapped-key");

        assert_eq!(
            DownloadLogRepository::new(&fixture.db)
                .distinct_downloaders(&file_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture.downloads.authorize("missing", "10.0.0.1").await,
            Err(AppError::NotFound(_))
        ));
    }
}
