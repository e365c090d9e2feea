use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::types::{FetchProtection, ResultStatus};

pub const MAX_FEED_URL_LEN: usize = 500;
pub const MAX_SOURCE_URL_LEN: usize = 1000;

/// One feed inside a scrape job message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPayload {
    pub feed_id: i32,
    pub feed_url: String,
    #[serde(default)]
    pub company_id: Option<i32>,
    #[serde(default)]
    pub host_header: Option<String>,
    #[serde(default)]
    pub fetchprotection: FetchProtection,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_db_article_published_at: Option<DateTime<Utc>>,
}

impl FeedPayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.feed_id < 1 {
            return Err(PayloadError(format!("feed_id must be >= 1, got {}", self.feed_id)));
        }
        if self.feed_url.trim().is_empty() {
            return Err(PayloadError("feed_url must not be empty".into()));
        }
        if self.feed_url.len() > MAX_FEED_URL_LEN {
            return Err(PayloadError(format!(
                "feed_url exceeds {MAX_FEED_URL_LEN} chars"
            )));
        }
        Ok(())
    }

    /// Grouping key for rate limiting and interleaving. Feeds without a
    /// positive company id are each their own group.
    pub fn company_key(&self) -> String {
        match self.company_id {
            Some(company_id) if company_id > 0 => format!("company:{company_id}"),
            _ => format!("feed:{}", self.feed_id),
        }
    }
}

/// A job message on the requests stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJobRequest {
    pub job_id: String,
    pub requested_at: DateTime<Utc>,
    pub ingest: bool,
    pub requested_by: String,
    pub feeds: Vec<FeedPayload>,
}

impl ScrapeJobRequest {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.job_id.trim().is_empty() {
            return Err(PayloadError("job_id must not be empty".into()));
        }
        for feed in &self.feeds {
            feed.validate()?;
        }
        Ok(())
    }
}

/// One normalized article extracted from a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl FeedSource {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.title.trim().is_empty() {
            return Err(PayloadError("source title must not be empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(PayloadError("source url must not be empty".into()));
        }
        if self.url.len() > MAX_SOURCE_URL_LEN {
            return Err(PayloadError(format!(
                "source url exceeds {MAX_SOURCE_URL_LEN} chars"
            )));
        }
        Ok(())
    }
}

/// Per-feed outcome published by workers on a result stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub job_id: String,
    pub ingest: bool,
    pub feed_id: i32,
    pub feed_url: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub new_etag: Option<String>,
    #[serde(default)]
    pub new_last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fetchprotection: FetchProtection,
    #[serde(default)]
    pub sources: Vec<FeedSource>,
}

impl WorkerResult {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.job_id.trim().is_empty() {
            return Err(PayloadError("job_id must not be empty".into()));
        }
        if self.feed_id < 1 {
            return Err(PayloadError(format!("feed_id must be >= 1, got {}", self.feed_id)));
        }
        if self.feed_url.trim().is_empty() || self.feed_url.len() > MAX_FEED_URL_LEN {
            return Err(PayloadError("feed_url must be 1..=500 chars".into()));
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(feed_id: i32, company_id: Option<i32>) -> FeedPayload {
        FeedPayload {
            feed_id,
            feed_url: "https://example.com/rss.xml".to_string(),
            company_id,
            host_header: None,
            fetchprotection: FetchProtection::Default,
            etag: None,
            last_update: None,
            last_db_article_published_at: None,
        }
    }

    #[test]
    fn company_key_prefers_positive_company_id() {
        assert_eq!(feed(7, Some(3)).company_key(), "company:3");
        assert_eq!(feed(7, Some(0)).company_key(), "feed:7");
        assert_eq!(feed(7, None).company_key(), "feed:7");
    }

    #[test]
    fn feed_payload_rejects_bad_ids_and_urls() {
        assert!(feed(0, None).validate().is_err());

        let mut long_url = feed(1, None);
        long_url.feed_url = "x".repeat(MAX_FEED_URL_LEN + 1);
        assert!(long_url.validate().is_err());

        assert!(feed(1, None).validate().is_ok());
    }

    #[test]
    fn fetchprotection_defaults_to_one_when_absent() {
        let parsed: FeedPayload =
            serde_json::from_str(r#"{"feed_id": 3, "feed_url": "https://a/rss"}"#).unwrap();
        assert_eq!(parsed.fetchprotection, FetchProtection::Default);
    }

    #[test]
    fn worker_result_rejects_invalid_sources() {
        let result = WorkerResult {
            job_id: "j".into(),
            ingest: true,
            feed_id: 1,
            feed_url: "https://a/rss".into(),
            status: ResultStatus::Success,
            error_message: None,
            new_etag: None,
            new_last_update: None,
            fetchprotection: FetchProtection::Default,
            sources: vec![FeedSource {
                title: "  ".into(),
                url: "https://a/x".into(),
                summary: None,
                author: None,
                published_at: None,
                image_url: None,
            }],
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn request_payload_round_trips_through_json() {
        let request = ScrapeJobRequest {
            job_id: "b74f9c3e-0000-0000-0000-000000000000".into(),
            requested_at: Utc::now(),
            ingest: false,
            requested_by: "rss_feeds_check_endpoint".into(),
            feeds: vec![feed(1, Some(2))],
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: ScrapeJobRequest = serde_json::from_str(&json).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.feeds[0].company_key(), "company:2");
    }
}
