use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;

use crate::db::jobs::{get_scrape_job_status_read, list_scrape_job_feed_reads, JobFeedRead, JobStatusRead};
use crate::error::ApiError;
use crate::AppState;

pub async fn read_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusRead>, ApiError> {
    get_scrape_job_status_read(&state.pool, &job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("RSS scrape job {job_id} not found")))
}

pub async fn read_job_feeds(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<JobFeedRead>>, ApiError> {
    if get_scrape_job_status_read(&state.pool, &job_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("RSS scrape job {job_id} not found")));
    }
    Ok(Json(list_scrape_job_feed_reads(&state.pool, &job_id).await?))
}
