use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use manifeed_common::{Config, StreamBus};

mod catalog;
mod db;
mod error;
mod job_lock;
mod jwt;
mod orchestrator;
mod rest;
mod util;

use catalog::repo::CatalogRepository;
use job_lock::JobLocks;
use jwt::WorkerTokenService;
use orchestrator::JobOrchestrator;

pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: JobOrchestrator,
    pub locks: JobLocks,
    pub worker_tokens: WorkerTokenService,
    pub catalog: CatalogRepository,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("manifeed=info".parse()?))
        .init();

    let config = Config::api_from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let bus = Arc::new(StreamBus::connect(&config.redis_url)?);
    let orchestrator = JobOrchestrator::new(
        pool.clone(),
        bus,
        config.requests_stream.clone(),
        config.queue_batch_size,
    );

    let state = Arc::new(AppState {
        pool: pool.clone(),
        orchestrator,
        locks: JobLocks::new(config.database_url.clone()),
        worker_tokens: WorkerTokenService::new(&config),
        catalog: CatalogRepository::new(
            config.repository_url.clone(),
            config.repository_branch.clone(),
            config.repository_path.clone(),
        ),
    });

    let app = Router::new()
        .route("/health/", get(rest::health::read_health))
        .route("/rss/", get(rest::rss::read_rss_feeds))
        .route(
            "/rss/feeds/{feed_id}/enabled",
            patch(rest::rss::update_rss_feed_enabled),
        )
        .route(
            "/rss/companies/{company_id}/enabled",
            patch(rest::rss::update_rss_company_enabled),
        )
        .route("/rss/sync", post(rest::rss::sync_rss_feeds))
        .route("/rss/feeds/check", post(rest::rss::check_rss_feeds))
        .route("/rss/img/{*icon_path}", get(rest::rss::read_rss_icon))
        .route("/sources/", get(rest::sources::read_sources))
        .route("/sources/ingest", post(rest::sources::ingest_sources))
        .route(
            "/sources/partitions/maintenance",
            post(rest::sources::maintain_source_partitions),
        )
        .route(
            "/sources/feeds/{feed_id}",
            get(rest::sources::read_sources_by_feed),
        )
        .route(
            "/sources/companies/{company_id}",
            get(rest::sources::read_sources_by_company),
        )
        .route("/sources/{source_id}", get(rest::sources::read_source_by_id))
        .route("/jobs/{job_id}", get(rest::jobs::read_job_status))
        .route("/jobs/{job_id}/feeds", get(rest::jobs::read_job_feeds))
        .route(
            "/internal/workers/token",
            post(rest::internal::issue_worker_token),
        )
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let address = format!("{}:{}", config.api_host, config.api_port);
    info!(address = %address, "manifeed-api listening");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// CORS from `CORS_ORIGINS`: `*` (or unset) allows any origin without
/// credentials; an explicit list allows credentials.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}
