use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;
use tracing::error;

use manifeed_common::BusError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyRunning(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid worker credentials")]
    InvalidWorkerCredentials,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    CatalogParse(String),

    #[error("{0}")]
    RepositorySync(String),

    #[error("Unable to publish RSS scrape job")]
    QueuePublish(#[source] BusError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    /// Every user-visible failure is a single `{message}` body. Internal
    /// errors are logged but never leak details to the response.
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::AlreadyRunning(message) => (StatusCode::CONFLICT, message.clone()),
            ApiError::Forbidden(message) => (StatusCode::CONFLICT, message.clone()),
            ApiError::InvalidWorkerCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ApiError::Validation(message) | ApiError::CatalogParse(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
            ApiError::RepositorySync(message) => (StatusCode::BAD_GATEWAY, message.clone()),
            ApiError::QueuePublish(source) => {
                error!(error = %source, "Scrape job publish failed");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            ApiError::Database(source) => {
                error!(error = %source, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Internal(source) => {
                error!(error = %source, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
