//! File upload and management routes
//!
//! Endpoints:
//! - POST /api/v1/files/upload/initiate - Start a chunked upload
//! - POST /api/v1/files/upload/chunk - Confirm an uploaded chunk
//! - POST /api/v1/files/upload/complete - Assemble and record the key
//! - GET /api/v1/files/recent - Caller's files, newest first
//! - GET /api/v1/files/:file_id - File info
//! - PATCH /api/v1/files/:file_id - Flip gate booleans

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::RequireAuth;
use crate::db::{DownloadLogRepository, FileRecord, FileRepository, RequestRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{
    ChunkUploadRequest, ChunkUploadResponse, CompleteUploadRequest, CompleteUploadResponse,
    FileStatus, InitiateUploadRequest, InitiateUploadResponse, MAX_CHUNK_SIZE,
};

/// Body limit for the chunk endpoint: a base64-encoded chunk (~4/3 expansion)
/// plus JSON framing, so a full `MAX_CHUNK_SIZE` chunk fits under the cap.
const CHUNK_BODY_LIMIT: usize = MAX_CHUNK_SIZE as usize * 2;

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload/initiate", post(initiate_upload))
        .route(
            "/upload/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(CHUNK_BODY_LIMIT)),
        )
        .route("/upload/complete", post(complete_upload))
        .route("/recent", get(get_recent_files))
        .route("/:file_id", get(get_file_info).patch(update_file))
}

// ============================================================================
// Response Types
// ============================================================================

/// File information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoResponse {
    pub file_id: String,
    pub share_id: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub status: FileStatus,
    pub created_at: String,
    pub expires_at: String,
    pub max_downloads: i64,
    pub download_count: i64,
    pub blocks_requests: bool,
    pub blocks_downloads: bool,
}

impl FileInfoResponse {
    pub fn from_record(file: &FileRecord, download_count: i64) -> Self {
        Self {
            file_id: file.id.clone(),
            share_id: file.share_id.clone(),
            filename: file.filename.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            status: FileStatus::parse(&file.upload_status).unwrap_or(FileStatus::Failed),
            created_at: file.created_at.clone(),
            expires_at: file.expires_at.clone(),
            max_downloads: file.max_downloads,
            download_count,
            blocks_requests: file.blocks_requests,
            blocks_downloads: file.blocks_downloads,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFileItem {
    #[serde(flatten)]
    pub info: FileInfoResponse,
    pub request_count: i64,
    pub pending_request_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilesResponse {
    pub files: Vec<RecentFileItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

/// Gate updates. The gates are monotonic; passing `false` never clears one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdateRequest {
    #[serde(default)]
    pub blocks_requests: Option<bool>,
    #[serde(default)]
    pub blocks_downloads: Option<bool>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/files/upload/initiate
async fn initiate_upload(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<InitiateUploadRequest>,
) -> Result<Json<InitiateUploadResponse>> {
    let response = state.uploads().initiate(&user.id, request).await?;
    Ok(Json(response))
}

/// POST /api/v1/files/upload/chunk
///
/// Chunk confirmation carries the session capability token, so it needs no
/// separate authentication.
async fn upload_chunk(
    State(state): State<AppState>,
    Json(request): Json<ChunkUploadRequest>,
) -> Result<Json<ChunkUploadResponse>> {
    let response = state.uploads().confirm_chunk(request).await?;
    Ok(Json(response))
}

/// POST /api/v1/files/upload/complete
async fn complete_upload(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CompleteUploadRequest>,
) -> Result<Json<CompleteUploadResponse>> {
    let share_id = state
        .assembly()
        .complete(&request.session_key, &user.id, &request.encrypted_key)
        .await?;

    Ok(Json(CompleteUploadResponse {
        message: "Upload completed successfully".to_string(),
        share_id,
    }))
}

/// GET /api/v1/files/recent
async fn get_recent_files(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentFilesResponse>> {
    let files_repo = FileRepository::new(state.db());
    let downloads = DownloadLogRepository::new(state.db());
    let requests = RequestRepository::new(state.db());

    let total = files_repo.count_for_owner(&user.id).await?;
    let files = files_repo
        .list_recent(&user.id, query.limit, query.offset)
        .await?;

    let mut items = Vec::with_capacity(files.len());
    for file in &files {
        let download_count = downloads.distinct_downloaders(&file.id).await?;
        let (request_count, pending_request_count) = requests.count_for_file(&file.id).await?;
        items.push(RecentFileItem {
            info: FileInfoResponse::from_record(file, download_count),
            request_count,
            pending_request_count,
        });
    }

    Ok(Json(RecentFilesResponse {
        files: items,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /api/v1/files/:file_id
async fn get_file_info(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileInfoResponse>> {
    let file = FileRepository::new(state.db())
        .get(&file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let download_count = DownloadLogRepository::new(state.db())
        .distinct_downloaders(&file.id)
        .await?;

    Ok(Json(FileInfoResponse::from_record(&file, download_count)))
}

/// PATCH /api/v1/files/:file_id
async fn update_file(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(file_id): Path<String>,
    Json(request): Json<FileUpdateRequest>,
) -> Result<Json<FileInfoResponse>> {
    let files = FileRepository::new(state.db());
    let file = files
        .get(&file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if file.owner_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to update this file".to_string(),
        ));
    }

    if state.security().is_expired(&file.expires_at) {
        return Err(AppError::Gone("Cannot update expired file".to_string()));
    }

    files
        .set_gates(&file_id, request.blocks_requests, request.blocks_downloads)
        .await?;

    let updated = files
        .get(&file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let download_count = DownloadLogRepository::new(state.db())
        .distinct_downloaders(&file_id)
        .await?;

    Ok(Json(FileInfoResponse::from_record(&updated, download_count)))
}
