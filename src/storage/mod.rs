//! Object storage for encrypted file content.
//!
//! The database is the single source of truth for status; the object store
//! holds bytes only. Backends are pluggable behind [`ObjectStore`]:
//! S3-compatible services (MinIO, Cloudflare R2, Backblaze B2, AWS S3) for
//! deployment, an in-memory store for tests and local development.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use std::time::Duration;

use crate::error::StorageError;

/// Blob-store collaborator contract.
///
/// Every call is a network round trip that may fail transiently; callers
/// treat failures as retryable and never leave database state half-applied
/// around one.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing content at `key`.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Read an object's full content.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Presign a PUT URL so clients can upload chunk bytes directly.
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}
