use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;

use crate::error::ApiError;
use crate::AppState;

/// DB liveness ping.
pub async fn read_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
