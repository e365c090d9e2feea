use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use manifeed_common::payloads::FeedPayload;
use manifeed_common::types::JobStatus;

pub struct NewScrapeJob<'a> {
    pub job_id: &'a str,
    pub ingest: bool,
    pub requested_by: &'a str,
    pub requested_at: DateTime<Utc>,
    pub status: JobStatus,
}

/// Insert the job row plus one snapshot row per feed. Runs inside the
/// caller's transaction so the job becomes visible atomically.
pub async fn create_scrape_job(
    conn: &mut PgConnection,
    job: &NewScrapeJob<'_>,
    feeds: &[FeedPayload],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO rss_scrape_jobs (
            job_id, ingest, requested_by, requested_at, feed_count, status, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, now())
        "#,
    )
    .bind(job.job_id)
    .bind(job.ingest)
    .bind(job.requested_by)
    .bind(job.requested_at)
    .bind(feeds.len() as i32)
    .bind(job.status.as_str())
    .execute(&mut *conn)
    .await?;

    for feed in feeds {
        sqlx::query(
            r#"
            INSERT INTO rss_scrape_job_feeds (
                job_id, feed_id, feed_url, last_db_article_published_at
            ) VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(job.job_id)
        .bind(feed.feed_id)
        .bind(&feed.feed_url)
        .bind(feed.last_db_article_published_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn set_scrape_job_status(
    pool: &PgPool,
    job_id: &str,
    status: JobStatus,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE rss_scrape_jobs SET status = $1, updated_at = now() WHERE job_id = $2")
            .bind(status.as_str())
            .bind(job_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Aggregate view of a job: stored status plus per-state result counts.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusRead {
    pub job_id: String,
    pub ingest: bool,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub status: String,
    pub feeds_total: i32,
    pub feeds_processed: i64,
    pub feeds_success: i64,
    pub feeds_not_modified: i64,
    pub feeds_error: i64,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: String,
    ingest: bool,
    requested_by: String,
    requested_at: DateTime<Utc>,
    status: String,
    feed_count: i32,
}

pub async fn get_scrape_job_status_read(
    pool: &PgPool,
    job_id: &str,
) -> Result<Option<JobStatusRead>, sqlx::Error> {
    let job: Option<JobRow> = sqlx::query_as(
        r#"
        SELECT job_id, ingest, requested_by, requested_at, status, feed_count
        FROM rss_scrape_jobs
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    let Some(job) = job else {
        return Ok(None);
    };

    let (processed, success, not_modified, errors): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'success'),
            COUNT(*) FILTER (WHERE status = 'not_modified'),
            COUNT(*) FILTER (WHERE status = 'error')
        FROM rss_scrape_job_results
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    Ok(Some(JobStatusRead {
        job_id: job.job_id,
        ingest: job.ingest,
        requested_by: job.requested_by,
        requested_at: job.requested_at,
        status: job.status,
        feeds_total: job.feed_count,
        feeds_processed: processed,
        feeds_success: success,
        feeds_not_modified: not_modified,
        feeds_error: errors,
    }))
}

/// Per-feed view of a job. Feeds without a result row report `"pending"`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobFeedRead {
    pub feed_id: i32,
    pub feed_url: String,
    pub status: String,
    pub error_message: Option<String>,
    pub fetchprotection: Option<i16>,
    pub new_etag: Option<String>,
    pub new_last_update: Option<DateTime<Utc>>,
}

pub async fn list_scrape_job_feed_reads(
    pool: &PgPool,
    job_id: &str,
) -> Result<Vec<JobFeedRead>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            jf.feed_id,
            jf.feed_url,
            COALESCE(r.status, 'pending') AS status,
            r.error_message,
            r.fetchprotection,
            r.new_etag,
            r.new_last_update
        FROM rss_scrape_job_feeds jf
        LEFT JOIN rss_scrape_job_results r
            ON r.job_id = jf.job_id AND r.feed_id = jf.feed_id
        WHERE jf.job_id = $1
        ORDER BY jf.feed_id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}
