//! `KxError -> HTTP` per spec.md §7: `NotFound` 404, `Forbidden` 403,
//! `Conflict` 409, `Invalid` 400, `Unavailable` 503, `Transient` 503 with
//! `Retry-After`, `Fatal` 500. Body shape mirrors the teacher pack's
//! `code`/`message` envelope.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kx_core::error::KxError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

pub struct ApiError(pub KxError);

impl From<KxError> for ApiError {
    fn from(e: KxError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retry_after) = match &self.0 {
            KxError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            KxError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            KxError::Conflict(_) => (StatusCode::CONFLICT, "conflict", None),
            KxError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid", None),
            KxError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", None),
            KxError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient", Some(1)),
            KxError::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fatal", None),
        };

        let body = Json(ErrorBody { code, message: self.0.to_string() });
        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from_str(&seconds.to_string()).unwrap());
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
