//! Mapping of core errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quill_core::core_access::CollabError;
use quill_core::core_store::StoreError;
use tracing::error;

use crate::types::ErrorResponse;

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError(pub CollabError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let CollabError::Internal(detail) = &self.0 {
            error!(error = %detail, "Request failed");
        }

        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CollabError> for ApiError {
    fn from(err: CollabError) -> Self {
        ApiError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CollabError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (CollabError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (CollabError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CollabError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CollabError::TransferFailed("x".into()), StatusCode::CONFLICT),
            (CollabError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
