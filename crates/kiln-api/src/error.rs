use kiln_core::{CoreError, ResolveError};
use kiln_model::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl ApiError {
    /// Code reported in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Resolve(e) => e.code().as_str(),
            ApiError::Core(e) => e.code().as_str(),
        }
    }

    /// `true` when the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            ApiError::InvalidRequest(_) | ApiError::NotFound(_) => true,
            ApiError::Resolve(e) => e.code().is_validation(),
            ApiError::Core(e) => e.code() != ErrorCode::UnknownError,
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ if self.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
