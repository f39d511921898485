//! Access request types

use serde::{Deserialize, Serialize};

/// Access request status. `pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Create an access request against a share
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessRequestBody {
    /// Public 12-character share identifier
    pub share_id: String,

    /// Optional free-text reason shown to the uploader
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response for a created (or deduplicated) access request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessRequestResponse {
    pub request_id: String,
    pub status: RequestStatus,
    pub created_at: String,
}

/// Approve a request, carrying the key wrapped for the recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequestBody {
    pub encrypted_key: String,
}

/// Response after approving a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequestResponse {
    pub request_id: String,
    pub status: RequestStatus,
    pub approved_at: String,
}

/// Reject a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequestBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// File summary embedded in a request-status response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFileInfo {
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
}

/// Status projection for the recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusResponse {
    pub request_id: String,
    pub status: RequestStatus,
    pub created_at: String,
    pub file_info: RequestFileInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_available: Option<bool>,
}

/// One request in the uploader's per-file listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestItem {
    pub request_id: String,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub created_at: String,
}

/// Listing of requests against one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequestListResponse {
    pub requests: Vec<AccessRequestItem>,
}
