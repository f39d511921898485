//! Download routes
//!
//! Endpoints:
//! - GET /api/v1/download/:request_id/file - Stream the encrypted content
//! - POST /api/v1/download/:request_id/decrypt-key - Release the content key
//!
//! Both responses carry cache-disabling headers: the payloads are one-shot
//! secrets and must never land in an intermediary cache.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::state::AppState;

use super::client_ip;

/// Create the download router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:request_id/file", get(download_file))
        .route("/:request_id/decrypt-key", post(get_decrypt_key))
}

/// RFC 6266 Content-Disposition value for a download. ASCII filenames pass
/// through quoted; anything else uses the RFC 5987 extended notation.
fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!("attachment; filename*=UTF-8''{}", urlencoding::encode(filename))
    }
}

/// GET /api/v1/download/:request_id/file
async fn download_file(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let ip = client_ip(&headers);

    let payload = state.downloads().authorize(&request_id, &ip).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, payload.mime_type)
        .header(header::CONTENT_LENGTH, payload.size)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&payload.filename),
        )
        .header(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        )
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(payload.data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptKeyResponse {
    encrypted_key: String,
}

/// POST /api/v1/download/:request_id/decrypt-key
async fn get_decrypt_key(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Response> {
    let encrypted_key = state.downloads().release_key(&request_id).await?;

    let mut response = Json(DecryptKeyResponse { encrypted_key }).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_filenames_pass_through_unescaped() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn non_ascii_filenames_use_extended_notation() {
        assert_eq!(
            content_disposition("資料.pdf"),
            "attachment; filename*=UTF-8''%E8%B3%87%E6%96%99.pdf"
        );
    }
}
