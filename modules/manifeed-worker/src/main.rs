use anyhow::Result;
use tracing_subscriber::EnvFilter;

use manifeed_common::Config;
use manifeed_worker::ScrapeWorker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("manifeed=info".parse()?))
        .init();

    let config = Config::worker_from_env();
    let worker = ScrapeWorker::new(&config)?;
    worker.run().await?;
    Ok(())
}
