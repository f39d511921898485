//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Shared files. Records are never hard-deleted; expiry flips the two gate
-- booleans instead.
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    share_id TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    encrypted_key TEXT NOT NULL DEFAULT '',
    storage_key TEXT NOT NULL DEFAULT '',
    upload_status TEXT NOT NULL DEFAULT 'uploading',
    chunk_count INTEGER NOT NULL,
    uploaded_chunks INTEGER NOT NULL DEFAULT 0,
    max_downloads INTEGER NOT NULL DEFAULT 1,
    blocks_requests INTEGER NOT NULL DEFAULT 0,
    blocks_downloads INTEGER NOT NULL DEFAULT 0,
    owner_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_share_id ON files(share_id);
CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id);
CREATE INDEX IF NOT EXISTS idx_files_expires ON files(expires_at);

-- Chunk bookkeeping during an upload. Rows are deleted after assembly.
CREATE TABLE IF NOT EXISTS file_chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id),
    chunk_index INTEGER NOT NULL,
    size INTEGER NOT NULL,
    storage_key TEXT NOT NULL,
    uploaded_at TEXT,

    UNIQUE(file_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_file_chunks_file ON file_chunks(file_id);

-- One upload attempt's capability token and state.
CREATE TABLE IF NOT EXISTS upload_sessions (
    id TEXT PRIMARY KEY,
    session_key TEXT NOT NULL UNIQUE,
    file_id TEXT NOT NULL REFERENCES files(id),
    status TEXT NOT NULL DEFAULT 'active',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_upload_sessions_key ON upload_sessions(session_key);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_expires ON upload_sessions(expires_at);

-- Recipient access requests. Never deleted; status only moves forward.
CREATE TABLE IF NOT EXISTS access_requests (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL UNIQUE,
    file_id TEXT NOT NULL REFERENCES files(id),
    reason TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    ip_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    approved_at TEXT,
    rejected_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_access_requests_request_id ON access_requests(request_id);
CREATE INDEX IF NOT EXISTS idx_access_requests_file ON access_requests(file_id);
CREATE INDEX IF NOT EXISTS idx_access_requests_ip ON access_requests(file_id, ip_hash, status);

-- Audit log of content releases. Append-only; the download quota counts
-- distinct request_id values, not rows.
CREATE TABLE IF NOT EXISTS download_logs (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id),
    request_id TEXT NOT NULL REFERENCES access_requests(id),
    ip_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_download_logs_file ON download_logs(file_id);
CREATE INDEX IF NOT EXISTS idx_download_logs_request ON download_logs(request_id);
"#;
