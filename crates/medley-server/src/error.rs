//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`medley_core::Error`]
//! converts with `?` and renders as the error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: medley_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: medley_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn inner(&self) -> &medley_core::Error {
        &self.inner
    }
}

impl From<medley_core::Error> for AppError {
    fn from(e: medley_core::Error) -> Self {
        Self::new(e)
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
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Server error in API handler"
            );
        }

        let body = json!({
            "success": false,
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        let mut response = (status, axum::Json(body)).into_response();
        // The request-id middleware fills in the id after the handler ran.
        response.extensions_mut().insert(ErrorMarker);
        response
    }
}

/// Marks responses rendered from an [`AppError`] so the request-id
/// middleware can stamp the id into the body.
#[derive(Debug, Clone, Copy)]
pub struct ErrorMarker;
