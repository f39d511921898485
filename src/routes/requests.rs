//! Access request routes
//!
//! Endpoints:
//! - POST /api/v1/requests - Create (or return the pending) access request
//! - GET /api/v1/requests/file/:file_id - Requests against a file
//! - POST /api/v1/requests/:request_id/approve - Approve a pending request
//! - POST /api/v1/requests/:request_id/reject - Reject a pending request
//! - GET /api/v1/requests/:request_id/status - Recipient status poll

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::db::{AccessRequestRecord, FileRepository, RequestRepository};
use crate::error::{AppError, Result};
use crate::requests::{
    AccessRequestItem, ApproveRequestBody, ApproveRequestResponse, CreateAccessRequestBody,
    CreateAccessRequestResponse, CreateOutcome, FileRequestListResponse, RejectRequestBody,
    RequestFileInfo, RequestStatus, RequestStatusResponse,
};
use crate::state::AppState;

use super::client_ip;

/// Create the requests router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_access_request))
        .route("/file/:file_id", get(get_file_requests))
        .route("/:request_id/approve", post(approve_request))
        .route("/:request_id/reject", post(reject_request))
        .route("/:request_id/status", get(get_request_status))
}

fn status_of(record: &AccessRequestRecord) -> RequestStatus {
    RequestStatus::parse(&record.status).unwrap_or(RequestStatus::Pending)
}

/// POST /api/v1/requests
///
/// Anonymous: recipients only hold the share id. The requester IP is hashed
/// before it touches the database.
async fn create_access_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateAccessRequestBody>,
) -> Result<(StatusCode, Json<CreateAccessRequestResponse>)> {
    let ip = client_ip(&headers);

    let outcome = state
        .requests()
        .create(&body.share_id, body.reason, &ip)
        .await?;

    let (status, record) = match &outcome {
        CreateOutcome::Created(record) => (StatusCode::CREATED, record),
        CreateOutcome::Existing(record) => (StatusCode::OK, record),
    };

    Ok((
        status,
        Json(CreateAccessRequestResponse {
            request_id: record.request_id.clone(),
            status: status_of(record),
            created_at: record.created_at.clone(),
        }),
    ))
}

/// GET /api/v1/requests/file/:file_id
async fn get_file_requests(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRequestListResponse>> {
    let file = FileRepository::new(state.db())
        .get(&file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let records = RequestRepository::new(state.db()).list_for_file(&file.id).await?;

    let requests = records
        .iter()
        .map(|record| AccessRequestItem {
            request_id: record.request_id.clone(),
            reason: record.reason.clone(),
            status: status_of(record),
            created_at: record.created_at.clone(),
        })
        .collect();

    Ok(Json(FileRequestListResponse { requests }))
}

/// POST /api/v1/requests/:request_id/approve
async fn approve_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<ApproveRequestBody>,
) -> Result<Json<ApproveRequestResponse>> {
    let record = state
        .requests()
        .approve(&request_id, &body.encrypted_key)
        .await?;

    Ok(Json(ApproveRequestResponse {
        request_id: record.request_id.clone(),
        status: status_of(&record),
        approved_at: record.approved_at.clone().unwrap_or_default(),
    }))
}

/// POST /api/v1/requests/:request_id/reject
async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    body: Option<Json<RejectRequestBody>>,
) -> Result<Json<serde_json::Value>> {
    let reason = body.and_then(|Json(b)| b.reason);

    state.requests().reject(&request_id, reason).await?;

    Ok(Json(json!({ "message": "Request rejected successfully" })))
}

/// GET /api/v1/requests/:request_id/status
async fn get_request_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<RequestStatusResponse>> {
    let (record, file) = state.requests().status(&request_id).await?;

    let status = status_of(&record);
    let approved = status == RequestStatus::Approved;

    Ok(Json(RequestStatusResponse {
        request_id: record.request_id.clone(),
        status,
        created_at: record.created_at.clone(),
        file_info: RequestFileInfo {
            filename: file.filename,
            size: file.size,
            mime_type: file.mime_type,
        },
        approved_at: if approved { record.approved_at.clone() } else { None },
        download_available: approved.then_some(true),
    }))
}
