use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use manifeed_common::{Config, StreamBus};
use manifeed_db_manager::ResultConsumer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("manifeed=info".parse()?))
        .init();

    let config = Config::db_manager_from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let bus = Arc::new(StreamBus::connect(&config.redis_url)?);
    let consumer = ResultConsumer::new(bus, pool);
    consumer.run().await?;
    Ok(())
}
