//! Upload types and constants

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Smallest accepted chunk size: 1MB
pub const MIN_CHUNK_SIZE: i64 = 1024 * 1024;

/// Largest accepted chunk size: 50MB
pub const MAX_CHUNK_SIZE: i64 = 50 * 1024 * 1024;

/// Default file expiry window: one week
pub const DEFAULT_EXPIRES_IN_HOURS: i64 = 24 * 7;

/// Longest accepted file expiry window: 30 days
pub const MAX_EXPIRES_IN_HOURS: i64 = 30 * 24;

/// Largest accepted per-file download ceiling
pub const MAX_DOWNLOADS_CEILING: i64 = 100;

// ============================================================================
// Status Types
// ============================================================================

/// File upload status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Chunks still outstanding
    Uploading,
    /// Every chunk confirmed, assembly not yet run
    ChunksReceived,
    /// Assembled, encrypted key recorded, downloadable
    Completed,
    /// Upload abandoned or failed
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::ChunksReceived => "chunks_received",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(Self::Uploading),
            "chunks_received" => Some(Self::ChunksReceived),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Upload session status. Transitions only move forward: active→completed
/// or active→expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

// ============================================================================
// Initiate Types
// ============================================================================

/// Request to start a chunked upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    /// Original file name
    pub filename: String,

    /// Total file size in bytes
    pub size: i64,

    /// MIME type of the (plaintext) file
    pub mime_type: String,

    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,

    /// File expiry window in hours
    #[serde(default = "default_expires_in_hours")]
    pub expires_in_hours: i64,

    /// Maximum number of distinct downloaders
    #[serde(default = "default_max_downloads")]
    pub max_downloads: i64,
}

fn default_chunk_size() -> i64 {
    5 * 1024 * 1024
}

fn default_expires_in_hours() -> i64 {
    DEFAULT_EXPIRES_IN_HOURS
}

fn default_max_downloads() -> i64 {
    1
}

/// Response to an initiate request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    /// File identifier
    pub file_id: String,

    /// Public 12-character share identifier
    pub share_id: String,

    /// Private capability token for this upload attempt
    pub session_key: String,

    /// Total chunks expected
    pub chunk_count: i64,

    /// One presigned PUT URL per chunk, in index order
    pub chunk_urls: Vec<String>,
}

// ============================================================================
// Chunk Confirmation Types
// ============================================================================

/// Confirm one uploaded chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadRequest {
    /// Session capability token
    pub session_key: String,

    /// Zero-based chunk index
    pub chunk_index: i64,

    /// Base64 encoded encrypted chunk bytes
    pub chunk_data: String,
}

/// Response after confirming a chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    /// Chunk index that was confirmed
    pub chunk_index: i64,

    /// Chunks confirmed so far
    pub uploaded_chunks: i64,

    /// Total chunks expected
    pub total_chunks: i64,

    /// Whether every chunk has been confirmed
    pub is_complete: bool,
}

// ============================================================================
// Complete Types
// ============================================================================

/// Finish an upload: assemble chunks and record the encrypted content key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    /// Session capability token
    pub session_key: String,

    /// Content key, encrypted client-side. The server never sees plaintext.
    pub encrypted_key: String,
}

/// Response after completing an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub message: String,

    /// Public share identifier for the completed file
    pub share_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_status_round_trips_through_strings() {
        for status in [
            FileStatus::Uploading,
            FileStatus::ChunksReceived,
            FileStatus::Completed,
            FileStatus::Failed,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("bogus"), None);
    }

    #[test]
    fn initiate_request_defaults_apply() {
        let req: InitiateUploadRequest = serde_json::from_str(
            r#"{"filename":"a.bin","size":1024,"mimeType":"application/octet-stream"}"#,
        )
        .unwrap();
        assert_eq!(req.chunk_size, 5 * 1024 * 1024);
        assert_eq!(req.expires_in_hours, DEFAULT_EXPIRES_IN_HOURS);
        assert_eq!(req.max_downloads, 1);
    }
}
