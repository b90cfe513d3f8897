use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::relay::RelayError;
use crate::resolver::ResolveError;
use crate::service::JobServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Resolution(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {0} is not finished yet")]
    NotReady(String),
    #[error("upstream fetch failed: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Resolution(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotReady(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Resolution(_) => "RESOLUTION_FAILED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::NotReady(_) => "NOT_READY",
            ApiError::Upstream(_) => "UPSTREAM_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<JobServiceError> for ApiError {
    fn from(value: JobServiceError) -> Self {
        match value {
            JobServiceError::Resolve(e) => e.into(),
            JobServiceError::NotFound(id) => ApiError::NotFound(id),
            JobServiceError::NotReady(id) => ApiError::NotReady(id),
            other @ (JobServiceError::Spawn(_) | JobServiceError::Join(_)) => {
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(value: RelayError) -> Self {
        match value {
            RelayError::Client(e) => ApiError::Internal(e),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::Spawn(e) => ApiError::Internal(format!("failed to run resolver: {e}")),
            other => ApiError::Resolution(other.to_string()),
        }
    }
}
