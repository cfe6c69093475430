//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`tcstream_common::Error`] so that route
//! handlers can return `Result<T, AppError>` and use `?` directly.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tcstream_common::Error;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
}

impl AppError {
    pub fn new(inner: Error) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Error {
        &self.inner
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::BadRequest(_) => "bad_request",
        Error::NotFound { .. } => "not_found",
        Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
        Error::Inactive(_) => "stream_inactive",
        Error::SegmentUnavailable { .. } => "segment_unavailable",
        Error::EncoderTimeout { .. } => "encoder_timeout",
        Error::Tool { .. } => "tool_error",
        Error::MissingMime(_) => "missing_mime",
        Error::Io { .. } => "io_error",
        Error::Config(_) => "config_error",
        Error::Internal(_) => "internal_error",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in stream handler"
            );
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Rejected request");
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": error_code(&self.inner),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let Error::RangeNotSatisfiable { size } = self.inner {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}
