use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("id generation failed: {0}")]
    Generation(#[from] snowkeeper_flake::Error),
    #[error("generator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Generation(snowkeeper_flake::Error::Cancelled) => {
                warn!("rejecting request during shutdown");
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Generation(e) => {
                error!(error = %e, "failed to generate id");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Task(e) => {
                error!(error = %e, "generator task panicked or was cancelled");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
