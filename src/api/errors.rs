//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::{Pc28Error, PlacementError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// NOT_FOUND, BAD_REQUEST, INTERNAL_ERROR, ...
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Placement refusals are the caller's fault; everything else is ours
    pub fn from_engine(request_id: String, err: Pc28Error) -> Self {
        match err {
            Pc28Error::Placement(
                e @ (PlacementError::RoundNotFound(_) | PlacementError::AccountNotFound(_)),
            ) => Self::not_found(request_id, e.to_string()),
            Pc28Error::Placement(e) => Self::bad_request(request_id, e.to_string()),
            other => {
                tracing::error!(request_id = %request_id, "request failed: {}", other);
                Self::internal_error(request_id, "internal error".to_string())
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;

    #[test]
    fn test_engine_error_mapping() {
        let missing = ApiError::from_engine("r1".into(), PlacementError::RoundNotFound(4).into());
        assert!(matches!(missing.kind, ApiErrorKind::NotFound(_)));

        let stake = ApiError::from_engine("r2".into(), PlacementError::NonPositiveStake.into());
        assert!(matches!(stake.kind, ApiErrorKind::BadRequest(_)));

        let io = ApiError::from_engine("r3".into(), StorageError::ReadFailed("disk".into()).into());
        assert!(matches!(io.kind, ApiErrorKind::InternalError(ref m) if !m.contains("disk")));
        assert_eq!(io.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
