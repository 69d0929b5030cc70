//! 统一的 API 错误类型与 JSON 错误响应。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;

use crate::chunk::ChunkError;
use crate::locking::LockError;
use crate::storage::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (ApiError::BadRequest(error)
        | ApiError::Conflict(error)
        | ApiError::PayloadTooLarge(error)
        | ApiError::Internal(error)) = self;
        (status, JsonResponse(ErrorBody { error })).into_response()
    }
}

impl From<ChunkError> for ApiError {
    fn from(error: ChunkError) -> Self {
        ApiError::BadRequest(error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<LockError> for ApiError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Timeout(_) => ApiError::Conflict("file is busy".into()),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(format!("invalid multipart form: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        let message = format!("invalid multipart form: {}", error.body_text());
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::BadRequest(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = ApiError::from(ChunkError::InvalidTotal);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "invalid totalChunks"));
    }

    #[test]
    fn store_errors_are_internal() {
        let err = ApiError::from(StoreError::IncompleteWrite {
            expected: 4,
            written: 2,
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lock_timeout_is_conflict() {
        let err = ApiError::from(LockError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
