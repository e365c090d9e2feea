use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use manifeed_common::payloads::{FeedPayload, ScrapeJobRequest};
use manifeed_common::types::JobStatus;
use manifeed_common::StreamBus;

use crate::db::feeds::list_feed_scrape_payloads;
use crate::db::jobs::{create_scrape_job, set_scrape_job_status, NewScrapeJob};
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct QueuedJobRead {
    pub job_id: String,
    pub status: JobStatus,
}

/// Turns a user intent over a set of feeds into a durable job plus a batched
/// sequence of messages on the requests stream.
pub struct JobOrchestrator {
    pool: PgPool,
    bus: Arc<StreamBus>,
    requests_stream: String,
    batch_size: usize,
}

impl JobOrchestrator {
    pub fn new(pool: PgPool, bus: Arc<StreamBus>, requests_stream: String, batch_size: usize) -> Self {
        Self {
            pool,
            bus,
            requests_stream,
            batch_size: batch_size.max(1),
        }
    }

    /// Check jobs select by id filter with no enabled restriction.
    pub async fn enqueue_feed_check(
        &self,
        feed_ids: Option<&[i32]>,
    ) -> Result<QueuedJobRead, ApiError> {
        self.enqueue(false, "rss_feeds_check_endpoint", feed_ids, false)
            .await
    }

    /// Ingest jobs select enabled feeds only.
    pub async fn enqueue_sources_ingest(
        &self,
        feed_ids: Option<&[i32]>,
    ) -> Result<QueuedJobRead, ApiError> {
        self.enqueue(true, "sources_ingest_endpoint", feed_ids, true)
            .await
    }

    async fn enqueue(
        &self,
        ingest: bool,
        requested_by: &'static str,
        feed_ids: Option<&[i32]>,
        enabled_only: bool,
    ) -> Result<QueuedJobRead, ApiError> {
        let feeds = list_feed_scrape_payloads(&self.pool, feed_ids, enabled_only).await?;

        let job_id = Uuid::new_v4().to_string();
        let requested_at = Utc::now();
        let status = if feeds.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::Queued
        };

        // The job and its feed snapshot commit before anything reaches the
        // bus, so workers can never observe a job the store does not know.
        let mut tx = self.pool.begin().await?;
        create_scrape_job(
            &mut *tx,
            &NewScrapeJob {
                job_id: &job_id,
                ingest,
                requested_by,
                requested_at,
                status,
            },
            &feeds,
        )
        .await?;
        tx.commit().await?;

        if !feeds.is_empty() {
            let mixed = interleave_by_company(feeds);
            for batch in mixed.chunks(self.batch_size) {
                let request = ScrapeJobRequest {
                    job_id: job_id.clone(),
                    requested_at,
                    ingest,
                    requested_by: requested_by.to_string(),
                    feeds: batch.to_vec(),
                };
                let payload = serde_json::to_string(&request)
                    .map_err(|err| ApiError::Internal(err.into()))?;

                if let Err(err) = self.bus.publish(&self.requests_stream, &payload).await {
                    self.mark_job_failed(&job_id).await;
                    return Err(ApiError::QueuePublish(err));
                }
            }
            info!(job_id = %job_id, ingest, feeds = mixed.len(), "Scrape job published");
        }

        Ok(QueuedJobRead { job_id, status })
    }

    /// Best-effort terminal mark after a publish failure. The job row itself
    /// is never rolled back; existence with `failed` status is a legitimate
    /// terminal state.
    async fn mark_job_failed(&self, job_id: &str) {
        if let Err(err) = set_scrape_job_status(&self.pool, job_id, JobStatus::Failed).await {
            error!(job_id, error = %err, "Failed to mark job as failed after publish error");
        }
    }
}

/// Round-robin feeds across companies so no two consecutive feeds share a
/// company when alternatives exist. Group order follows first arrival.
pub fn interleave_by_company(feeds: Vec<FeedPayload>) -> Vec<FeedPayload> {
    if feeds.len() <= 1 {
        return feeds;
    }

    let mut company_order: Vec<String> = Vec::new();
    let mut queues: HashMap<String, VecDeque<FeedPayload>> = HashMap::new();
    for feed in feeds {
        let company_key = feed.company_key();
        if !queues.contains_key(&company_key) {
            company_order.push(company_key.clone());
        }
        queues.entry(company_key).or_default().push_back(feed);
    }

    let mut mixed = Vec::new();
    let mut has_pending = true;
    while has_pending {
        has_pending = false;
        for company_key in &company_order {
            let Some(queue) = queues.get_mut(company_key) else {
                continue;
            };
            if let Some(feed) = queue.pop_front() {
                mixed.push(feed);
                has_pending = true;
            }
        }
    }
    mixed
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

    fn ids(feeds: &[FeedPayload]) -> Vec<i32> {
        feeds.iter().map(|f| f.feed_id).collect()
    }

    #[test]
    fn interleaves_companies_round_robin() {
        // company pattern [10,10,20,20,30] -> [10a, 20a, 30a, 10b, 20b]
        let feeds = vec![
            feed(1, Some(10)),
            feed(2, Some(10)),
            feed(3, Some(20)),
            feed(4, Some(20)),
            feed(5, Some(30)),
        ];
        let mixed = interleave_by_company(feeds);
        assert_eq!(ids(&mixed), vec![1, 3, 5, 2, 4]);
    }

    #[test]
    fn no_two_consecutive_feeds_share_a_company_when_avoidable() {
        let feeds = vec![
            feed(1, Some(1)),
            feed(2, Some(1)),
            feed(3, Some(1)),
            feed(4, Some(2)),
            feed(5, Some(2)),
            feed(6, Some(3)),
        ];
        let mixed = interleave_by_company(feeds);
        for pair in mixed.windows(2) {
            if pair[0].company_key() == pair[1].company_key() {
                // Allowed only when every other queue has drained.
                let remaining: Vec<_> = mixed
                    .iter()
                    .skip_while(|f| f.feed_id != pair[0].feed_id)
                    .collect();
                assert!(remaining
                    .iter()
                    .all(|f| f.company_key() == pair[0].company_key()));
            }
        }
    }

    #[test]
    fn companyless_feeds_are_their_own_groups() {
        let feeds = vec![feed(1, None), feed(2, None), feed(3, None)];
        let mixed = interleave_by_company(feeds);
        assert_eq!(ids(&mixed), vec![1, 2, 3]);
    }

    #[test]
    fn single_feed_passes_through() {
        let feeds = vec![feed(9, Some(4))];
        let mixed = interleave_by_company(feeds);
        assert_eq!(ids(&mixed), vec![9]);
    }
}
