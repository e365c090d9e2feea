use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;

use crate::db::partitions::{repartition_default_sources, PartitionMaintenanceRead};
use crate::db::sources::{get_source_detail_read, list_source_reads, SourceDetailRead, SourcePageRead};
use crate::error::ApiError;
use crate::orchestrator::QueuedJobRead;
use crate::rest::FeedIdsParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    fn validated(&self) -> Result<(i64, i64), ApiError> {
        let limit = self.limit.unwrap_or(50);
        if !(1..=100).contains(&limit) {
            return Err(ApiError::Validation(
                "limit must be between 1 and 100".to_string(),
            ));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::Validation("offset must be >= 0".to_string()));
        }
        Ok((limit, offset))
    }
}

pub async fn read_sources(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<SourcePageRead>, ApiError> {
    let (limit, offset) = params.validated()?;
    Ok(Json(
        list_source_reads(&state.pool, limit, offset, None, None).await?,
    ))
}

pub async fn read_sources_by_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<i32>,
    Query(params): Query<PageParams>,
) -> Result<Json<SourcePageRead>, ApiError> {
    let (limit, offset) = params.validated()?;
    Ok(Json(
        list_source_reads(&state.pool, limit, offset, Some(feed_id), None).await?,
    ))
}

pub async fn read_sources_by_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
    Query(params): Query<PageParams>,
) -> Result<Json<SourcePageRead>, ApiError> {
    let (limit, offset) = params.validated()?;
    Ok(Json(
        list_source_reads(&state.pool, limit, offset, None, Some(company_id)).await?,
    ))
}

pub async fn read_source_by_id(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i32>,
) -> Result<Json<SourceDetailRead>, ApiError> {
    get_source_detail_read(&state.pool, source_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Source {source_id} not found")))
}

pub async fn ingest_sources(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedIdsParams>,
) -> Result<Json<QueuedJobRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run(
            "sources_ingest",
            "Sources ingest already running",
            || async move {
                action_state
                    .orchestrator
                    .enqueue_sources_ingest(params.parsed().as_deref())
                    .await
            },
        )
        .await
        .map(Json)
}

/// Move default-partition articles into weekly partitions.
pub async fn maintain_source_partitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PartitionMaintenanceRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run(
            "sources_repartition",
            "Source repartition already running",
            || async move {
                repartition_default_sources(&action_state.pool)
                    .await
                    .map_err(ApiError::from)
            },
        )
        .await
        .map(Json)
}
