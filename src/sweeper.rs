//! Expiry Sweeper
//!
//! Periodic background actor that retires expired state:
//! - expired files lose their storage objects and get both gate booleans set
//!   (the database record is kept as an audit trail)
//! - expired sessions that never completed are deleted outright
//!
//! Individual item failures are collected into the run report and never
//! abort the batch; a run that cannot reach the database logs and waits for
//! the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::interval;

use crate::db::{ChunkRepository, FileRepository, SessionRepository};
use crate::storage::ObjectStore;

/// Outcome of the file half of a sweep
#[derive(Debug, Default)]
pub struct FileSweepOutcome {
    /// Files whose gates were set this run
    pub processed: usize,
    /// Expired, not-yet-gated files found
    pub total_expired: usize,
    pub errors: Vec<String>,
}

/// Outcome of the session half of a sweep
#[derive(Debug, Default)]
pub struct SessionSweepOutcome {
    /// Sessions deleted this run
    pub deleted: usize,
    /// Expired active sessions found
    pub total_expired: usize,
    pub errors: Vec<String>,
}

/// Full report for one sweep run
#[derive(Debug, Default)]
pub struct SweepReport {
    pub files: FileSweepOutcome,
    pub sessions: SessionSweepOutcome,
}

/// Periodic expiry sweeper
pub struct Sweeper {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    tick: Duration,
}

impl Sweeper {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, interval_secs: u64) -> Self {
        Self {
            db,
            store,
            tick: Duration::from_secs(interval_secs),
        }
    }

    /// Run the sweep loop. Never returns; spawn it as a background task.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.tick.as_secs(),
            "Expiry sweeper started"
        );

        let mut timer = interval(self.tick);

        loop {
            timer.tick().await;
            let report = self.sweep_once().await;
            if report.files.processed > 0
                || report.sessions.deleted > 0
                || !report.files.errors.is_empty()
                || !report.sessions.errors.is_empty()
            {
                tracing::info!(
                    files_processed = report.files.processed,
                    files_expired = report.files.total_expired,
                    sessions_deleted = report.sessions.deleted,
                    sessions_expired = report.sessions.total_expired,
                    errors = report.files.errors.len() + report.sessions.errors.len(),
                    "Sweep completed"
                );
            }
        }
    }

    /// One sweep over expired files and sessions.
    pub async fn sweep_once(&self) -> SweepReport {
        SweepReport {
            files: self.sweep_files().await,
            sessions: self.sweep_sessions().await,
        }
    }

    async fn sweep_files(&self) -> FileSweepOutcome {
        let mut outcome = FileSweepOutcome::default();
        let now = Utc::now().to_rfc3339();

        let files = FileRepository::new(&self.db);
        let expired = match files.list_expired_ungated(&now).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!("Failed to list expired files: {}", e);
                outcome.errors.push(format!("list expired files: {}", e));
                return outcome;
            }
        };

        outcome.total_expired = expired.len();
        if expired.is_empty() {
            return outcome;
        }

        tracing::info!(count = expired.len(), "Found expired files to clean up");

        for file in &expired {
            // Remaining chunk objects belong to uploads that never finished.
            match ChunkRepository::new(&self.db).list_for_file(&file.id).await {
                Ok(chunks) => {
                    for chunk in chunks {
                        if let Err(e) = self.store.delete(&chunk.storage_key).await {
                            tracing::warn!(
                                file_id = %file.id,
                                chunk_index = chunk.chunk_index,
                                "Failed to delete chunk object: {}",
                                e
                            );
                            outcome
                                .errors
                                .push(format!("chunk {} of file {}: {}", chunk.chunk_index, file.id, e));
                        }
                    }
                }
                Err(e) => {
                    outcome.errors.push(format!("list chunks of file {}: {}", file.id, e));
                }
            }

            // The assembled object, when one exists.
            if !file.storage_key.is_empty() {
                if let Err(e) = self.store.delete(&file.storage_key).await {
                    tracing::warn!(file_id = %file.id, "Failed to delete file object: {}", e);
                    outcome.errors.push(format!("object of file {}: {}", file.id, e));
                }
            }

            // Gate the record; it is never hard-deleted. The selection
            // predicate skips fully-gated files, so re-runs are no-ops.
            match files.set_gates(&file.id, Some(true), Some(true)).await {
                Ok(()) => {
                    outcome.processed += 1;
                    tracing::info!(
                        file_id = %file.id,
                        filename = %file.filename,
                        "Expired file gated and storage cleaned"
                    );
                }
                Err(e) => {
                    tracing::error!(file_id = %file.id, "Failed to gate expired file: {}", e);
                    outcome.errors.push(format!("gate file {}: {}", file.id, e));
                }
            }
        }

        outcome
    }

    async fn sweep_sessions(&self) -> SessionSweepOutcome {
        let mut outcome = SessionSweepOutcome::default();
        let now = Utc::now().to_rfc3339();

        let sessions = SessionRepository::new(&self.db);
        let expired = match sessions.list_expired_active(&now).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!("Failed to list expired sessions: {}", e);
                outcome.errors.push(format!("list expired sessions: {}", e));
                return outcome;
            }
        };

        outcome.total_expired = expired.len();
        if expired.is_empty() {
            return outcome;
        }

        tracing::info!(count = expired.len(), "Found expired upload sessions to clean up");

        for session in &expired {
            match sessions.delete(&session.id).await {
                Ok(_) => {
                    outcome.deleted += 1;
                    tracing::debug!(session_id = %session.id, "Deleted expired upload session");
                }
                Err(e) => {
                    tracing::error!(session_id = %session.id, "Failed to delete session: {}", e);
                    outcome.errors.push(format!("session {}: {}", session.id, e));
                }
            }
        }

        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_file_record, new_session_record, ChunkRecord, SessionMetadata};
    use crate::security::Security;
    use crate::storage::MemoryObjectStore;
    use uuid::Uuid;

    struct Fixture {
        sweeper: Sweeper,
        db: SqlitePool,
        store: Arc<MemoryObjectStore>,
    }

    async fn fixture() -> Fixture {
        let db = crate::db::create_memory_pool().await.unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        Fixture {
            sweeper: Sweeper::new(db.clone(), store.clone(), 300),
            db,
            store,
        }
    }

    /// Seed an expired, half-uploaded file with one stored chunk object and
    /// an expired active session. Returns (file_id, chunk_key, session_key).
    async fn seed_expired_upload(fixture: &Fixture) -> (String, String, String) {
        let security = Security::new("test-salt");
        let expired_at = "2000-01-01T00:00:00+00:00".to_string();

        let mut file = new_file_record(
            security.generate_share_id(),
            "stale.enc".to_string(),
            1024,
            "application/octet-stream".to_string(),
            2,
            1,
            "owner-1".to_string(),
            expired_at.clone(),
        );
        file.uploaded_chunks = 1;

        let chunk_key = security.chunk_key(&file.id, 0);
        fixture
            .store
            .put(&chunk_key, vec![0u8; 16], "application/octet-stream")
            .await
            .unwrap();

        let chunks = vec![
            ChunkRecord {
                id: Uuid::new_v4().to_string(),
                file_id: file.id.clone(),
                chunk_index: 0,
                size: 512,
                storage_key: chunk_key.clone(),
                uploaded_at: Some(Utc::now().to_rfc3339()),
            },
            ChunkRecord {
                id: Uuid::new_v4().to_string(),
                file_id: file.id.clone(),
                chunk_index: 1,
                size: 512,
                storage_key: security.chunk_key(&file.id, 1),
                uploaded_at: None,
            },
        ];

        let session_key = security.generate_session_key();
        let session = new_session_record(
            session_key.clone(),
            file.id.clone(),
            &SessionMetadata { chunk_size: 512, total_chunks: 2 },
            expired_at,
        );

        let file_id = file.id.clone();
        FileRepository::new(&fixture.db)
            .create_with_session(&file, &chunks, &session)
            .await
            .unwrap();

        (file_id, chunk_key, session_key)
    }

    #[tokio::test]
    async fn sweep_gates_expired_files_and_keeps_records() {
        let fixture = fixture().await;
        let (file_id, chunk_key, session_key) = seed_expired_upload(&fixture).await;

        let report = fixture.sweeper.sweep_once().await;

        assert_eq!(report.files.total_expired, 1);
        assert_eq!(report.files.processed, 1);
        assert_eq!(report.sessions.deleted, 1);
        assert!(report.files.errors.is_empty());
        assert!(report.sessions.errors.is_empty());

        // Gates set, record retained.
        let file = FileRepository::new(&fixture.db)
            .get(&file_id)
            .await
            .unwrap()
            .unwrap();
        assert!(file.blocks_requests);
        assert!(file.blocks_downloads);

        // Chunk object deleted, session gone.
        assert!(!fixture.store.contains(&chunk_key).await);
        assert!(SessionRepository::new(&fixture.db)
            .get_by_key(&session_key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let fixture = fixture().await;
        seed_expired_upload(&fixture).await;

        let first = fixture.sweeper.sweep_once().await;
        assert_eq!(first.files.processed, 1);

        // Fully-gated files fall out of the selection predicate.
        let second = fixture.sweeper.sweep_once().await;
        assert_eq!(second.files.total_expired, 0);
        assert_eq!(second.files.processed, 0);
        assert_eq!(second.sessions.total_expired, 0);
    }

    #[tokio::test]
    async fn sweep_ignores_live_files_and_sessions() {
        let fixture = fixture().await;

        let security = Security::new("test-salt");
        let file = new_file_record(
            security.generate_share_id(),
            "fresh.enc".to_string(),
            1024,
            "application/octet-stream".to_string(),
            1,
            1,
            "owner-1".to_string(),
            security.calculate_expiry(24),
        );
        let session = new_session_record(
            security.generate_session_key(),
            file.id.clone(),
            &SessionMetadata { chunk_size: 1024, total_chunks: 1 },
            security.calculate_expiry(24),
        );
        FileRepository::new(&fixture.db)
            .create_with_session(&file, &[], &session)
            .await
            .unwrap();

        let report = fixture.sweeper.sweep_once().await;
        assert_eq!(report.files.total_expired, 0);
        assert_eq!(report.sessions.total_expired, 0);
    }

    #[tokio::test]
    async fn completed_sessions_are_not_swept() {
        let fixture = fixture().await;
        let (_, _, session_key) = seed_expired_upload(&fixture).await;

        let sessions = SessionRepository::new(&fixture.db);
        let session = sessions.get_by_key(&session_key).await.unwrap().unwrap();
        sessions.complete(&session.id).await.unwrap();

        let report = fixture.sweeper.sweep_once().await;
        assert_eq!(report.sessions.total_expired, 0);
        assert!(sessions.get_by_key(&session_key).await.unwrap().is_some());
    }
}
