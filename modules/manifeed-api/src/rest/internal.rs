use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::jwt::IssuedWorkerToken;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkerTokenRequest {
    pub worker_id: String,
    pub worker_secret: String,
}

/// Issue a short-lived worker access token.
pub async fn issue_worker_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WorkerTokenRequest>,
) -> Result<Json<IssuedWorkerToken>, ApiError> {
    state
        .worker_tokens
        .issue(&payload.worker_id, &payload.worker_secret)
        .map(Json)
}
