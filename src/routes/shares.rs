//! Public share information route

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::{DownloadLogRepository, FileRepository};
use crate::error::{AppError, Result};
use crate::security::TOKEN_LEN;
use crate::state::AppState;
use crate::upload::FileStatus;

use super::files::FileInfoResponse;

/// Create the shares router
pub fn router() -> Router<AppState> {
    Router::new().route("/:share_id", get(get_share_info))
}

/// GET /api/v1/shares/:share_id
///
/// What a recipient sees before requesting access. Not itself a download.
async fn get_share_info(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Json<FileInfoResponse>> {
    if share_id.len() != TOKEN_LEN {
        return Err(AppError::BadRequest("Invalid share ID format".to_string()));
    }

    let file = FileRepository::new(state.db())
        .get_by_share_id(&share_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

    if file.upload_status != FileStatus::Completed.as_str() {
        return Err(AppError::BadRequest(
            "File upload is not completed".to_string(),
        ));
    }

    if state.security().is_expired(&file.expires_at) {
        return Err(AppError::Gone("This share has expired".to_string()));
    }

    let download_count = DownloadLogRepository::new(state.db())
        .distinct_downloaders(&file.id)
        .await?;

    Ok(Json(FileInfoResponse::from_record(&file, download_count)))
}
