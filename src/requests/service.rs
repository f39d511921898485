//! Access Request State Machine
//!
//! pending→approved or pending→rejected, enforced by conditional UPDATEs so
//! concurrent decisions cannot both win. Creation is idempotent per
//! (file, requester) while a pending request exists.

use sqlx::SqlitePool;

use crate::db::{AccessRequestRecord, DownloadLogRepository, FileRepository, RequestRepository};
use crate::error::{AppError, Result};
use crate::security::Security;
use crate::upload::FileStatus;

use super::types::RequestStatus;

/// Outcome of an access-request creation. "Already exists" is an expected
/// path, not an error, so it is a variant rather than an exception.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(AccessRequestRecord),
    Existing(AccessRequestRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &AccessRequestRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }
}

/// Manages access requests
#[derive(Clone)]
pub struct AccessRequestService {
    db: SqlitePool,
    security: Security,
}

impl AccessRequestService {
    pub fn new(db: SqlitePool, security: Security) -> Self {
        Self { db, security }
    }

    /// Create an access request against a share, or return the requester's
    /// still-pending one.
    pub async fn create(
        &self,
        share_id: &str,
        reason: Option<String>,
        client_ip: &str,
    ) -> Result<CreateOutcome> {
        if share_id.len() != crate::security::TOKEN_LEN {
            return Err(AppError::BadRequest("Invalid share ID format".to_string()));
        }

        let files = FileRepository::new(&self.db);
        let file = files
            .get_by_share_id(share_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

        if file.upload_status != FileStatus::Completed.as_str() {
            return Err(AppError::BadRequest("File is not available yet".to_string()));
        }

        if file.blocks_requests {
            return Err(AppError::Gone(
                "New requests for this share are blocked".to_string(),
            ));
        }

        if self.security.is_expired(&file.expires_at) {
            return Err(AppError::Gone("This share has expired".to_string()));
        }

        // Once the distinct-downloader quota is spent there is nothing left
        // to request.
        let downloaders = DownloadLogRepository::new(&self.db)
            .distinct_downloaders(&file.id)
            .await?;
        if downloaders >= file.max_downloads {
            return Err(AppError::Gone("Download limit exceeded".to_string()));
        }

        let ip_hash = self.security.hash_ip(client_ip);

        let requests = RequestRepository::new(&self.db);
        if let Some(existing) = requests.find_pending(&file.id, &ip_hash).await? {
            tracing::debug!(
                request_id = %existing.request_id,
                file_id = %file.id,
                "Returning existing pending access request"
            );
            return Ok(CreateOutcome::Existing(existing));
        }

        let request_id = self.security.generate_request_id();
        let record = requests
            .create(request_id, file.id.clone(), reason, ip_hash)
            .await?;

        tracing::info!(
            request_id = %record.request_id,
            file_id = %file.id,
            "Access request created"
        );

        Ok(CreateOutcome::Created(record))
    }

    /// Approve a pending request.
    ///
    /// TODO: persist `_encrypted_key_for_recipient` once access_requests
    /// grows a column for it; until then recipients fetch the file-level
    /// encrypted key at download time.
    pub async fn approve(
        &self,
        request_id: &str,
        _encrypted_key_for_recipient: &str,
    ) -> Result<AccessRequestRecord> {
        let requests = RequestRepository::new(&self.db);
        let request = requests
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if request.status != RequestStatus::Pending.as_str() {
            return Err(AppError::BadRequest(format!(
                "Request is already {}",
                request.status
            )));
        }

        let file = FileRepository::new(&self.db)
            .get(&request.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if self.security.is_expired(&file.expires_at) {
            return Err(AppError::Gone("File has expired".to_string()));
        }

        if !requests.approve(&request.id).await? {
            // A concurrent decision landed first; report its terminal state.
            let current = requests
                .get_by_request_id(request_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
            return Err(AppError::BadRequest(format!(
                "Request is already {}",
                current.status
            )));
        }

        let approved = requests
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        tracing::info!(request_id = %request_id, "Access request approved");

        Ok(approved)
    }

    /// Reject a pending request.
    pub async fn reject(&self, request_id: &str, _reason: Option<String>) -> Result<()> {
        let requests = RequestRepository::new(&self.db);
        let request = requests
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if request.status != RequestStatus::Pending.as_str() {
            return Err(AppError::BadRequest(format!(
                "Request is already {}",
                request.status
            )));
        }

        if !requests.reject(&request.id).await? {
            let current = requests
                .get_by_request_id(request_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;
            return Err(AppError::BadRequest(format!(
                "Request is already {}",
                current.status
            )));
        }

        tracing::info!(request_id = %request_id, "Access request rejected");

        Ok(())
    }

    /// Read-only status projection for the recipient.
    pub async fn status(
        &self,
        request_id: &str,
    ) -> Result<(AccessRequestRecord, crate::db::FileRecord)> {
        let request = RequestRepository::new(&self.db)
            .get_by_request_id(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        let file = FileRepository::new(&self.db)
            .get(&request.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        Ok((request, file))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_file_record;

    async fn service() -> AccessRequestService {
        let db = crate::db::create_memory_pool().await.unwrap();
        AccessRequestService::new(db, Security::new("test-salt"))
    }

    /// Insert a completed, unexpired file and return its share id.
    async fn seed_completed_file(service: &AccessRequestService, max_downloads: i64) -> String {
        let security = Security::new("test-salt");
        let share_id = security.generate_share_id();

        let mut file = new_file_record(
            share_id.clone(),
            "notes.txt.enc".to_string(),
            1024,
            "text/plain".to_string(),
            1,
            max_downloads,
            "owner-1".to_string(),
            security.calculate_expiry(24),
        );
        file.upload_status = "completed".to_string();
        file.uploaded_chunks = 1;
        file.encrypted_key = "key".to_string();
        file.storage_key = format!("files/{}/file", file.id);

        FileRepository::new(&service.db)
            .create_with_session(
                &file,
                &[],
                &crate::db::new_session_record(
                    security.generate_session_key(),
                    file.id.clone(),
                    &crate::db::SessionMetadata { chunk_size: 1024, total_chunks: 1 },
                    security.calculate_expiry(24),
                ),
            )
            .await
            .unwrap();

        share_id
    }

    #[tokio::test]
    async fn create_then_duplicate_returns_same_request() {
        let service = service().await;
        let share_id = seed_completed_file(&service, 1).await;

        let first = service
            .create(&share_id, Some("please".to_string()), "10.0.0.1")
            .await
            .unwrap();
        let CreateOutcome::Created(first_record) = &first else {
            panic!("expected a fresh request");
        };
        assert_eq!(first_record.status, "pending");
        assert_eq!(first_record.request_id.len(), 12);

        let second = service.create(&share_id, None, "10.0.0.1").await.unwrap();
        let CreateOutcome::Existing(second_record) = &second else {
            panic!("expected the existing request back");
        };
        assert_eq!(second_record.request_id, first_record.request_id);

        // A different requester still gets their own request.
        let other = service.create(&share_id, None, "10.0.0.2").await.unwrap();
        assert_ne!(other.record().request_id, first_record.request_id);
    }

    #[tokio::test]
    async fn create_rejects_unknown_and_malformed_share_ids() {
        let service = service().await;

        assert!(matches!(
            service.create("short", None, "10.0.0.1").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.create("AAAAbbbb1234", None, "10.0.0.1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_expired_shares() {
        let service = service().await;
        let share_id = seed_completed_file(&service, 1).await;

        sqlx::query("UPDATE files SET expires_at = ? WHERE share_id = ?")
            .bind("2000-01-01T00:00:00+00:00")
            .bind(&share_id)
            .execute(&service.db)
            .await
            .unwrap();

        assert!(matches!(
            service.create(&share_id, None, "10.0.0.1").await,
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_gated_shares() {
        let service = service().await;
        let share_id = seed_completed_file(&service, 1).await;

        sqlx::query("UPDATE files SET blocks_requests = 1 WHERE share_id = ?")
            .bind(&share_id)
            .execute(&service.db)
            .await
            .unwrap();

        assert!(matches!(
            service.create(&share_id, None, "10.0.0.1").await,
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn approve_is_terminal() {
        let service = service().await;
        let share_id = seed_completed_file(&service, 1).await;

        let outcome = service
            .create(&share_id, Some("please".to_string()), "10.0.0.1")
            .await
            .unwrap();
        let request_id = outcome.record().request_id.clone();

        let approved = service.approve(&request_id, "recipient-key").await.unwrap();
        assert_eq!(approved.status, "approved");
        assert!(approved.approved_at.is_some());
        assert!(approved.rejected_at.is_none());

        // Repeated decisions of either kind hit the terminal-state wall.
        let again = service.approve(&request_id, "recipient-key").await;
        match again {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "Request is already approved"),
            other => panic!("expected BadRequest, got {:?}", other.map(|r| r.status)),
        }
        assert!(matches!(
            service.reject(&request_id, None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let service = service().await;
        let share_id = seed_completed_file(&service, 1).await;

        let outcome = service.create(&share_id, None, "10.0.0.1").await.unwrap();
        let request_id = outcome.record().request_id.clone();

        service.reject(&request_id, Some("no".to_string())).await.unwrap();

        let (record, _) = service.status(&request_id).await.unwrap();
        assert_eq!(record.status, "rejected");
        assert!(record.rejected_at.is_some());
        assert!(record.approved_at.is_none());

        assert!(matches!(
            service.approve(&request_id, "key").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn status_reports_unknown_requests() {
        let service = service().await;
        assert!(matches!(
            service.status("nope").await,
            Err(AppError::NotFound(_))
        ));
    }
}
