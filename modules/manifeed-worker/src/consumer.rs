use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use manifeed_common::bus::{
    StreamBus, StreamMessage, CHECK_RESULTS_STREAM, ERROR_RESULTS_STREAM, INGEST_RESULTS_STREAM,
    WORKER_GROUP,
};
use manifeed_common::payloads::{FeedPayload, ScrapeJobRequest, WorkerResult};
use manifeed_common::types::ResultStatus;
use manifeed_common::Config;

use crate::auth::WorkerAuth;
use crate::error::WorkerError;
use crate::fetch::{fetch_feed_result, FETCH_TIMEOUT};
use crate::limiter::{CompanyRateLimiter, RateLimiterMap};

const QUEUE_BLOCK_MS: usize = 5000;
const LOOP_BACKOFF: Duration = Duration::from_secs(1);

/// One scrape worker process: consumes job messages, fetches feeds under
/// per-company rate limits, and publishes one result per feed.
pub struct ScrapeWorker {
    bus: Arc<StreamBus>,
    auth: WorkerAuth,
    http: reqwest::Client,
    limiters: RateLimiterMap,
    requests_stream: String,
    consumer_name: String,
    read_count: usize,
}

impl ScrapeWorker {
    pub fn new(config: &Config) -> Result<Self, WorkerError> {
        let bus = Arc::new(StreamBus::connect(&config.redis_url)?);
        let auth = WorkerAuth::new(config)?;
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|err| WorkerError::Auth(format!("HTTP client build failed: {err}")))?;

        Ok(Self {
            bus,
            auth,
            http,
            limiters: RateLimiterMap::new(config.company_max_requests_per_second),
            requests_stream: config.requests_stream.clone(),
            consumer_name: config.worker_id.clone(),
            read_count: config.queue_read_count,
        })
    }

    /// Run forever. Individual failures are logged and retried after a short
    /// pause; the loop itself never returns under normal operation.
    pub async fn run(&self) -> Result<(), WorkerError> {
        self.bus
            .ensure_group(&self.requests_stream, WORKER_GROUP)
            .await?;
        info!(stream = %self.requests_stream, "worker_rss_scrapper started");

        loop {
            if let Err(err) = self.tick().await {
                warn!(error = %err, "Worker loop error");
                tokio::time::sleep(LOOP_BACKOFF).await;
            }
        }
    }

    async fn tick(&self) -> Result<(), WorkerError> {
        self.auth.ensure_authenticated().await?;

        let messages = match self
            .bus
            .read_group(
                &[self.requests_stream.as_str()],
                WORKER_GROUP,
                &self.consumer_name,
                self.read_count,
                QUEUE_BLOCK_MS,
            )
            .await
        {
            Ok(messages) => messages,
            Err(err) if err.is_missing_group() => {
                self.bus
                    .ensure_group(&self.requests_stream, WORKER_GROUP)
                    .await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if messages.is_empty() {
            return Ok(());
        }

        let outcomes = join_all(messages.iter().map(|message| self.process_message(message))).await;
        for outcome in outcomes {
            outcome?;
        }
        Ok(())
    }

    /// Handle one job message. The message is ACK'd only after every
    /// per-feed result is published; a crash before that point means
    /// redelivery, which downstream persistence absorbs idempotently.
    async fn process_message(&self, message: &StreamMessage) -> Result<(), WorkerError> {
        let job: ScrapeJobRequest = match serde_json::from_str(&message.payload) {
            Ok(job) => job,
            Err(err) => {
                error!(id = %message.id, error = %err, "Invalid scrape job payload");
                self.ack(message).await?;
                return Ok(());
            }
        };
        if let Err(err) = job.validate() {
            error!(id = %message.id, error = %err, "Invalid scrape job payload");
            self.ack(message).await?;
            return Ok(());
        }

        let pools = group_feeds_by_company(&job.feeds);
        let outcomes = join_all(
            pools
                .iter()
                .map(|(company_key, feeds)| self.process_company_pool(&job, company_key, feeds)),
        )
        .await;
        for outcome in outcomes {
            outcome?;
        }

        self.ack(message).await
    }

    async fn process_company_pool(
        &self,
        job: &ScrapeJobRequest,
        company_key: &str,
        feeds: &[&FeedPayload],
    ) -> Result<(), WorkerError> {
        let limiter = self.limiters.get(company_key);
        let outcomes = join_all(
            feeds
                .iter()
                .copied()
                .map(|feed| self.process_feed(job, &limiter, feed)),
        )
        .await;
        for outcome in outcomes {
            outcome?;
        }
        Ok(())
    }

    async fn process_feed(
        &self,
        job: &ScrapeJobRequest,
        limiter: &CompanyRateLimiter,
        feed: &FeedPayload,
    ) -> Result<(), WorkerError> {
        limiter.acquire().await;

        let outcome = fetch_feed_result(&self.http, feed).await;
        let result = WorkerResult {
            job_id: job.job_id.clone(),
            ingest: job.ingest,
            feed_id: feed.feed_id,
            feed_url: feed.feed_url.clone(),
            status: outcome.status,
            error_message: outcome.error_message,
            new_etag: outcome.new_etag,
            new_last_update: outcome.new_last_update,
            fetchprotection: feed.fetchprotection,
            sources: outcome.sources,
        };

        let stream = result_stream(&result);
        let payload = serde_json::to_string(&result)?;
        self.bus.publish(stream, &payload).await?;
        Ok(())
    }

    async fn ack(&self, message: &StreamMessage) -> Result<(), WorkerError> {
        self.bus
            .ack(&self.requests_stream, WORKER_GROUP, &message.id)
            .await?;
        Ok(())
    }
}

/// Route a result: errors to the parsing-error stream, ingest results to the
/// ingest stream, everything else to the check stream.
fn result_stream(result: &WorkerResult) -> &'static str {
    if result.status == ResultStatus::Error {
        ERROR_RESULTS_STREAM
    } else if result.ingest {
        INGEST_RESULTS_STREAM
    } else {
        CHECK_RESULTS_STREAM
    }
}

/// Group a job's feeds by company key, preserving arrival order per group.
fn group_feeds_by_company(feeds: &[FeedPayload]) -> Vec<(String, Vec<&FeedPayload>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&FeedPayload>> = HashMap::new();
    for feed in feeds {
        let key = feed.company_key();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(feed);
    }
    order
        .into_iter()
        .map(|key| {
            let feeds = groups.remove(&key).unwrap_or_default();
            (key, feeds)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifeed_common::types::FetchProtection;

    fn feed(feed_id: i32, company_id: Option<i32>) -> FeedPayload {
        FeedPayload {
            feed_id,
            feed_url: format!("https://example.com/{feed_id}"),
            company_id,
            host_header: None,
            fetchprotection: FetchProtection::Default,
            etag: None,
            last_update: None,
            last_db_article_published_at: None,
        }
    }

    fn result(status: ResultStatus, ingest: bool) -> WorkerResult {
        WorkerResult {
            job_id: "j".into(),
            ingest,
            feed_id: 1,
            feed_url: "https://example.com/1".into(),
            status,
            error_message: None,
            new_etag: None,
            new_last_update: None,
            fetchprotection: FetchProtection::Default,
            sources: Vec::new(),
        }
    }

    #[test]
    fn errors_route_to_error_stream_regardless_of_ingest() {
        assert_eq!(result_stream(&result(ResultStatus::Error, true)), ERROR_RESULTS_STREAM);
        assert_eq!(result_stream(&result(ResultStatus::Error, false)), ERROR_RESULTS_STREAM);
    }

    #[test]
    fn non_errors_route_by_ingest_flag() {
        assert_eq!(result_stream(&result(ResultStatus::Success, true)), INGEST_RESULTS_STREAM);
        assert_eq!(
            result_stream(&result(ResultStatus::NotModified, false)),
            CHECK_RESULTS_STREAM
        );
    }

    #[test]
    fn grouping_preserves_order_and_separates_orphans() {
        let feeds = vec![feed(1, Some(10)), feed(2, None), feed(3, Some(10)), feed(4, Some(20))];
        let groups = group_feeds_by_company(&feeds);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0, "company:10");
        assert_eq!(groups[0].1.iter().map(|f| f.feed_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(groups[1].0, "feed:2");
        assert_eq!(groups[2].0, "company:20");
    }
}
