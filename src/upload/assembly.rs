//! File Assembly Engine
//!
//! Fetches every confirmed chunk, concatenates them in strict ascending index
//! order, writes the combined object, and retires the chunk objects. Until
//! the final write and key recording succeed the file stays in its
//! pre-completion state, so a failed completion is safe to retry.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::{ChunkRepository, FileRepository, SessionRepository};
use crate::error::{AppError, Result};
use crate::security::Security;
use crate::storage::ObjectStore;

/// Assembles uploaded chunks into the final stored object
#[derive(Clone)]
pub struct AssemblyEngine {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    security: Security,
}

impl AssemblyEngine {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, security: Security) -> Self {
        Self { db, store, security }
    }

    /// Complete an upload: assemble, store, record the encrypted key.
    /// Returns the file's share id.
    pub async fn complete(
        &self,
        session_key: &str,
        caller_id: &str,
        encrypted_key: &str,
    ) -> Result<String> {
        let sessions = SessionRepository::new(&self.db);
        let session = sessions
            .get_by_key(session_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Upload session not found".to_string()))?;

        let files = FileRepository::new(&self.db);
        let file = files
            .get(&session.file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if file.owner_id != caller_id {
            return Err(AppError::Forbidden(
                "Not authorized to complete this upload".to_string(),
            ));
        }

        if file.uploaded_chunks != file.chunk_count {
            return Err(AppError::BadRequest(
                "Not all chunks have been uploaded".to_string(),
            ));
        }

        // Concatenation must follow ascending chunk index regardless of the
        // order confirmations arrived in. The repository returns chunks
        // sorted ascending and try_join_all preserves input order.
        let chunks = ChunkRepository::new(&self.db).list_for_file(&file.id).await?;

        let parts = futures::future::try_join_all(
            chunks.iter().map(|chunk| self.store.get(&chunk.storage_key)),
        )
        .await
        .map_err(|e| AppError::Internal(format!("Failed to retrieve chunk: {}", e)))?;

        let combined = parts.concat();

        let storage_key = self.security.file_key(&file.id);
        self.store
            .put(&storage_key, combined, "application/octet-stream")
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store assembled file: {}", e)))?;

        files
            .mark_completed(&file.id, encrypted_key, &storage_key)
            .await?;

        // The canonical object exists; chunk cleanup is best effort.
        for chunk in &chunks {
            if let Err(e) = self.store.delete(&chunk.storage_key).await {
                tracing::warn!(
                    file_id = %file.id,
                    chunk_index = chunk.chunk_index,
                    "Failed to delete chunk object: {}",
                    e
                );
            }
        }
        ChunkRepository::new(&self.db).delete_for_file(&file.id).await?;

        sessions.complete(&session.id).await?;

        tracing::info!(
            file_id = %file.id,
            share_id = %file.share_id,
            size = file.size,
            chunks = file.chunk_count,
            "Upload completed"
        );

        Ok(file.share_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
