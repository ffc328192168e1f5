use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;
use troubleshoot_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("Database not configured")]
    StoreNotConfigured,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Store failures are one condition to clients; /test reports the difference.
        let (status, detail) = match &self {
            AppError::StoreNotConfigured => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Common(e) => {
                warn!(error = %e, "issue store request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database unavailable".to_string(),
                )
            }
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}
