//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{ErrorKind, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be read (bad header, path or body).
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Saga(#[from] SagaError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidArgument,
            ApiError::Saga(err) => err.kind(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::FailedPrecondition => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        metrics::counter!("http_errors_total", "kind" => kind.as_str()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string(), "kind": kind.as_str() });
        (status, axum::Json(body)).into_response()
    }
}
