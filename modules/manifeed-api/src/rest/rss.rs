use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::catalog::icons::resolve_icon_path;
use crate::catalog::repo::RepositoryAction;
use crate::catalog::sync::apply_catalog_sync;
use crate::db::companies::{get_company_read_by_id, set_company_enabled, CompanyRead};
use crate::db::feeds::{get_feed_read_by_id, list_feed_reads, set_feed_enabled, FeedRead};
use crate::error::ApiError;
use crate::orchestrator::QueuedJobRead;
use crate::rest::FeedIdsParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnabledTogglePayload {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncRead {
    pub repository_action: RepositoryAction,
}

pub async fn read_rss_feeds(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FeedRead>>, ApiError> {
    Ok(Json(list_feed_reads(&state.pool).await?))
}

pub async fn update_rss_feed_enabled(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<i32>,
    Json(payload): Json<EnabledTogglePayload>,
) -> Result<Json<FeedRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run(
            "rss_patch_feed_enabled",
            "RSS feed toggle already running",
            || async move { toggle_feed_enabled(&action_state, feed_id, payload.enabled).await },
        )
        .await
        .map(Json)
}

async fn toggle_feed_enabled(
    state: &AppState,
    feed_id: i32,
    enabled: bool,
) -> Result<FeedRead, ApiError> {
    let mut feed = get_feed_read_by_id(&state.pool, feed_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("RSS feed {feed_id} not found")))?;

    if feed.enabled == enabled {
        return Ok(feed);
    }

    if let Some(company_name) = &feed.company_name {
        if feed.company_enabled == Some(false) {
            return Err(ApiError::Forbidden(format!(
                "Cannot toggle feed {feed_id}: company '{company_name}' is disabled"
            )));
        }
    }

    if !set_feed_enabled(&state.pool, feed_id, enabled).await? {
        return Err(ApiError::NotFound(format!("RSS feed {feed_id} not found")));
    }
    feed.enabled = enabled;
    Ok(feed)
}

pub async fn update_rss_company_enabled(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
    Json(payload): Json<EnabledTogglePayload>,
) -> Result<Json<CompanyRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run(
            "rss_patch_company_enabled",
            "RSS company toggle already running",
            || async move {
                let mut company = get_company_read_by_id(&action_state.pool, company_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("RSS company {company_id} not found"))
                    })?;

                if company.enabled != payload.enabled {
                    set_company_enabled(&action_state.pool, company_id, payload.enabled).await?;
                    company.enabled = payload.enabled;
                }
                Ok(company)
            },
        )
        .await
        .map(Json)
}

/// Pull the catalog repository and apply changed files. `force=true`
/// re-applies every catalog file even on an unchanged revision.
pub async fn sync_rss_feeds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run("rss_sync", "RSS sync already running", || async move {
            let repository_sync = action_state.catalog.sync(params.force).await?;
            apply_catalog_sync(
                &action_state.pool,
                action_state.catalog.path(),
                &repository_sync.changed_files,
            )
            .await?;
            Ok(SyncRead {
                repository_action: repository_sync.action,
            })
        })
        .await
        .map(Json)
}

pub async fn check_rss_feeds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedIdsParams>,
) -> Result<Json<QueuedJobRead>, ApiError> {
    let action_state = Arc::clone(&state);
    state
        .locks
        .run(
            "rss_feed_check",
            "RSS feed check already running",
            || async move {
                action_state
                    .orchestrator
                    .enqueue_feed_check(params.parsed().as_deref())
                    .await
            },
        )
        .await
        .map(Json)
}

/// Serve an SVG icon from the catalog repository.
pub async fn read_rss_icon(
    State(state): State<Arc<AppState>>,
    Path(icon_path): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = resolve_icon_path(state.catalog.path(), &icon_path)?;
    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|_| ApiError::NotFound(format!("Icon not found: {icon_path}")))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], bytes).into_response())
}
